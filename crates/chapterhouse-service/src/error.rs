//! Service setup errors.
//!
//! Runtime operations report [`chapterhouse_core::CommerceError`]; this type
//! only covers wiring the service together.

use chapterhouse_store::StoreError;
use chapterhouse_wallet::WalletError;

use crate::cache::CacheError;

/// Errors raised while building a [`crate::CommerceService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The store could not be opened.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The wallet client could not be built.
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// The cache backend could not be reached.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Required settings are missing or contradictory.
    #[error("configuration error: {0}")]
    Configuration(String),
}

//! Wallet collaborator for chapterhouse.
//!
//! The wallet holds user balances outside this system. Purchases only ever
//! see it through the [`Wallet`] trait:
//!
//! - [`HttpWallet`]: client of a remote credits service
//! - [`MemoryWallet`]: in-process balances for tests and tooling
//!
//! # Example
//!
//! ```no_run
//! use chapterhouse_core::UserId;
//! use chapterhouse_wallet::{HttpWallet, Wallet};
//!
//! # async fn example() -> Result<(), chapterhouse_wallet::WalletError> {
//! let wallet = HttpWallet::new("http://wallet.internal:8080", "your-service-api-key")?;
//! let user_id = UserId::generate();
//!
//! let receipt = wallet.consume(&user_id, 299, "chapter purchase").await?;
//! println!("New balance: {} cents", receipt.balance_after_cents);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod http;
mod memory;
mod types;

pub use error::WalletError;
pub use http::{ClientOptions, HttpWallet};
pub use memory::{EntryKind, MemoryWallet, WalletEntry};
pub use types::*;

use async_trait::async_trait;
use chapterhouse_core::UserId;

/// Confirmation of an applied consume or refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletReceipt {
    /// Wallet-side identifier of the operation.
    pub receipt_id: String,
    /// Balance after the operation, in minor units.
    pub balance_after_cents: i64,
}

/// A user balance held outside this system.
///
/// `consume` and `refund` are atomic per user. The wallet does not
/// deduplicate, so callers must issue at most one `consume` per purchase.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Current balance in minor units.
    async fn get_balance(&self, user_id: &UserId) -> Result<i64, WalletError>;

    /// Deduct `amount_cents`, failing with [`WalletError::InsufficientFunds`]
    /// rather than going negative.
    async fn consume(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError>;

    /// Return `amount_cents` to the user.
    async fn refund(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError>;
}

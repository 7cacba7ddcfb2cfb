//! Error types for chapterhouse storage.

use chapterhouse_core::{CommerceError, OwnershipKey};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A ledger uniqueness key is already taken, by a committed record or by
    /// an in-flight purchase.
    #[error("ledger key already taken: {key}")]
    Conflict {
        /// The contested key.
        key: OwnershipKey,
    },

    /// A record violates a catalog invariant.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        Self::Database("store lock poisoned".into())
    }
}

impl From<StoreError> for CommerceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { key } => Self::AlreadyOwned {
                entity: key.entity(),
                id: key.content_id(),
            },
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::InvalidRecord(msg) => Self::InvalidOperation(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => {
                Self::TransientStore(msg)
            }
        }
    }
}

//! Error types for chapterhouse.

use crate::ids::IdError;

/// Result type for chapterhouse operations.
pub type Result<T> = std::result::Result<T, CommerceError>;

/// Errors surfaced by the access and purchase operations.
///
/// The first five variants are final answers for the caller to branch on.
/// `TransientStore` and `Timeout` may be retried from the top; `Wallet` is fatal
/// for the current attempt and never leaves a half-applied purchase behind.
#[derive(Debug, thiserror::Error)]
pub enum CommerceError {
    /// A chapter, book or purchase record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// The content is already owned by the user.
    #[error("{entity} already purchased: {id}")]
    AlreadyOwned {
        /// Kind of content (`chapter` or `book`).
        entity: &'static str,
        /// Identifier of the owned content.
        id: String,
    },

    /// The request cannot be honoured (free content, nothing eligible, ...).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The wallet balance is below the amount to charge.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance in minor units.
        balance: i64,
        /// Required amount in minor units.
        required: i64,
    },

    /// The content or ledger store failed (I/O, conflict, corruption).
    #[error("storage failure: {0}")]
    TransientStore(String),

    /// The wallet call failed.
    #[error("wallet failure: {0}")]
    Wallet(String),

    /// The caller deadline elapsed before the purchase committed.
    #[error("purchase timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl CommerceError {
    /// Shorthand for a missing chapter.
    #[must_use]
    pub fn chapter_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "chapter",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing book.
    #[must_use]
    pub fn book_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "book",
            id: id.to_string(),
        }
    }

    /// Whether the whole operation may be retried from the balance check.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::Timeout { .. })
    }

    /// Stable machine-readable code for the error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyOwned { .. } => "already_owned",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::TransientStore(_) => "store_failure",
            Self::Wallet(_) => "wallet_failure",
            Self::Timeout { .. } => "timeout",
            Self::InvalidId(_) => "invalid_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_and_timeout_failures_are_retryable() {
        assert!(CommerceError::TransientStore("io".into()).is_retryable());
        assert!(CommerceError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(!CommerceError::Wallet("down".into()).is_retryable());
        assert!(!CommerceError::InsufficientFunds {
            balance: 100,
            required: 599
        }
        .is_retryable());
        assert!(!CommerceError::chapter_not_found("x").is_retryable());
    }

    #[test]
    fn messages_carry_the_required_amount() {
        let err = CommerceError::InsufficientFunds {
            balance: 100,
            required: 599,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: balance=100, required=599"
        );
        assert_eq!(err.code(), "insufficient_funds");
    }
}

//! Wallet error types.

use chapterhouse_core::CommerceError;

/// Errors that can occur when talking to a wallet.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The balance cannot cover the amount.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// No wallet exists for the user.
    #[error("wallet not found: {user_id}")]
    AccountNotFound {
        /// The user ID.
        user_id: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration or arguments.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<WalletError> for CommerceError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds { balance, required } => {
                Self::InsufficientFunds { balance, required }
            }
            other => Self::Wallet(other.to_string()),
        }
    }
}

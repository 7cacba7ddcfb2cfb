//! Wire types for the wallet API.

use serde::{Deserialize, Serialize};

/// Response from `GET /v1/wallets/{user_id}/balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Current balance in minor units.
    pub balance_cents: i64,
}

/// Body of a consume or refund request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRequest {
    /// Amount in minor units, always positive.
    pub amount_cents: i64,
    /// Human-readable description recorded by the wallet.
    pub memo: String,
}

/// Response to a consume or refund request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerResponse {
    /// Wallet-side receipt for the operation.
    pub receipt_id: String,
    /// Balance after the operation, in minor units.
    pub balance_cents: i64,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}

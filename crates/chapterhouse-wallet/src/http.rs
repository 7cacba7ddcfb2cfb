//! HTTP wallet client.

use std::time::Duration;

use async_trait::async_trait;
use chapterhouse_core::UserId;
use reqwest::Client;

use crate::error::WalletError;
use crate::types::{ApiErrorResponse, BalanceResponse, LedgerRequest, LedgerResponse};
use crate::{Wallet, WalletReceipt};

/// Client of a remote credits service.
#[derive(Debug, Clone)]
pub struct HttpWallet {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl HttpWallet {
    /// Create a new wallet client with default options.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the credits service (e.g., `"http://wallet:8080"`)
    /// * `api_key` - Service API key for authentication
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, WalletError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new wallet client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, WalletError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| WalletError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    fn wallet_url(&self, user_id: &UserId, action: &str) -> String {
        format!("{}/v1/wallets/{user_id}/{action}", self.base_url)
    }

    async fn post_ledger(
        &self,
        user_id: &UserId,
        action: &str,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        if amount_cents <= 0 {
            return Err(WalletError::Configuration(format!(
                "{action} amount must be positive, got {amount_cents}"
            )));
        }

        let request = LedgerRequest {
            amount_cents,
            memo: memo.to_string(),
        };

        let response = self
            .client
            .post(self.wallet_url(user_id, action))
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        let body: LedgerResponse = self.handle_response(response).await?;

        tracing::debug!(
            user_id = %user_id,
            action,
            amount_cents,
            receipt_id = %body.receipt_id,
            "Wallet ledger operation applied"
        );

        Ok(WalletReceipt {
            receipt_id: body.receipt_id,
            balance_after_cents: body.balance_cents,
        })
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, WalletError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let details = api_error.error.details.as_ref();
                let detail = |name: &str| {
                    details
                        .and_then(|d| d.get(name))
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(0)
                };

                match api_error.error.code.as_str() {
                    "insufficient_credits" => Err(WalletError::InsufficientFunds {
                        balance: detail("balance"),
                        required: detail("required"),
                    }),
                    "not_found" => Err(WalletError::AccountNotFound {
                        user_id: api_error.error.message,
                    }),
                    code => Err(WalletError::Api {
                        code: code.to_string(),
                        message: api_error.error.message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(WalletError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl Wallet for HttpWallet {
    async fn get_balance(&self, user_id: &UserId) -> Result<i64, WalletError> {
        let response = self
            .client
            .get(self.wallet_url(user_id, "balance"))
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .send()
            .await?;

        let body: BalanceResponse = self.handle_response(response).await?;
        Ok(body.balance_cents)
    }

    async fn consume(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        self.post_ledger(user_id, "consume", amount_cents, memo).await
    }

    async fn refund(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        self.post_ledger(user_id, "refund", amount_cents, memo).await
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 10).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            service_name: "chapterhouse".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CommerceConfig {
    /// Path to `RocksDB` data directory (default: "/data/chapterhouse").
    pub data_dir: String,

    /// Wallet service base URL (optional).
    pub wallet_api_url: Option<String>,

    /// Wallet service API key (optional).
    pub wallet_api_key: Option<String>,

    /// Wallet request timeout in seconds.
    pub wallet_timeout_seconds: u64,

    /// Deadline for one purchase, in milliseconds.
    pub purchase_timeout_ms: u64,

    /// Namespace prepended to every cache key.
    pub cache_prefix: String,

    /// Redis URL for the shared cache (optional).
    pub redis_url: Option<String>,

    /// Longest wait for post-purchase cache invalidation, in milliseconds.
    pub cache_timeout_ms: u64,

    /// Default number of trial chapters per book.
    pub trial_chapters: usize,

    /// Name sent to the wallet service.
    pub service_name: String,
}

/// Wallet secrets file structure.
#[derive(Debug, Deserialize)]
struct WalletSecrets {
    api_url: String,
    api_key: String,
}

impl CommerceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Try to load wallet secrets from file first, then fall back to env vars
        let (wallet_api_url, wallet_api_key) = load_wallet_secrets();

        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            wallet_api_url,
            wallet_api_key,
            wallet_timeout_seconds: env_parse("WALLET_TIMEOUT_SECONDS")
                .unwrap_or(defaults.wallet_timeout_seconds),
            purchase_timeout_ms: env_parse("PURCHASE_TIMEOUT_MS")
                .unwrap_or(defaults.purchase_timeout_ms),
            cache_prefix: std::env::var("CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            cache_timeout_ms: env_parse("CACHE_TIMEOUT_MS").unwrap_or(defaults.cache_timeout_ms),
            trial_chapters: env_parse("TRIAL_CHAPTERS").unwrap_or(defaults.trial_chapters),
            service_name: std::env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }

    /// Whether both wallet URL and key are set.
    #[must_use]
    pub fn has_wallet(&self) -> bool {
        self.wallet_api_url.is_some() && self.wallet_api_key.is_some()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Load wallet secrets from file or environment.
fn load_wallet_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/wallet.json",
        "chapterhouse/.secrets/wallet.json",
        "../.secrets/wallet.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<WalletSecrets>(path) {
            tracing::info!(path = %path, "Loaded wallet secrets from file");
            return (Some(secrets.api_url), Some(secrets.api_key));
        }
    }

    // Fall back to environment variables
    tracing::debug!("Wallet secrets file not found, using environment variables");
    (
        std::env::var("WALLET_API_URL").ok(),
        std::env::var("WALLET_API_KEY").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data/chapterhouse".into(),
            wallet_api_url: None,
            wallet_api_key: None,
            wallet_timeout_seconds: 10,
            purchase_timeout_ms: 15_000,
            cache_prefix: "chapterhouse".into(),
            redis_url: None,
            cache_timeout_ms: 2_000,
            trial_chapters: 10,
            service_name: "chapterhouse".into(),
        }
    }
}

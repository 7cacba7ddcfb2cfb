//! The commerce service handle.

use std::sync::Arc;
use std::time::Duration;

use chapterhouse_store::Store;
use chapterhouse_wallet::Wallet;

use crate::cache::{Cache, CacheCoordinator, CacheKeys};
use crate::config::CommerceConfig;
#[cfg(feature = "rocksdb-backend")]
use crate::{cache::MemoryCache, error::ServiceError};

/// Access checks, purchases and purchase history over one store and wallet.
///
/// Cheap to clone; clones share the store, wallet and cache.
#[derive(Clone)]
pub struct CommerceService {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) wallet: Arc<dyn Wallet>,
    pub(crate) cache: CacheCoordinator,
    pub(crate) config: CommerceConfig,
}

impl CommerceService {
    /// Assemble a service from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        wallet: Arc<dyn Wallet>,
        cache: Arc<dyn Cache>,
        config: CommerceConfig,
    ) -> Self {
        let keys = CacheKeys::new(config.cache_prefix.clone());
        let timeout = Duration::from_millis(config.cache_timeout_ms);
        Self {
            store,
            wallet,
            cache: CacheCoordinator::new(cache, keys, timeout),
            config,
        }
    }

    /// Wire the production collaborators described by `config`.
    ///
    /// Opens a `RocksStore` at `data_dir`, connects the HTTP wallet, and uses
    /// Redis for the cache when `redis_url` is set, else an in-process cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the wallet is not configured, the store cannot be
    /// opened, or Redis is unreachable.
    #[cfg(feature = "rocksdb-backend")]
    pub async fn from_config(config: CommerceConfig) -> Result<Self, ServiceError> {
        use chapterhouse_store::RocksStore;
        use chapterhouse_wallet::{ClientOptions, HttpWallet};

        let (Some(url), Some(key)) = (&config.wallet_api_url, &config.wallet_api_key) else {
            return Err(ServiceError::Configuration(
                "wallet is not configured (WALLET_API_URL / WALLET_API_KEY)".into(),
            ));
        };

        tracing::info!(path = %config.data_dir, "Opening RocksDB store");
        let store: Arc<dyn Store> = Arc::new(RocksStore::open(&config.data_dir)?);

        let options = ClientOptions::with_service_name(config.service_name.clone())
            .timeout_seconds(config.wallet_timeout_seconds);
        let wallet: Arc<dyn Wallet> = Arc::new(HttpWallet::with_options(url, key, options)?);
        tracing::info!(wallet_url = %url, "Wallet client configured");

        let cache = Self::cache_from_config(&config).await?;

        tracing::info!(
            data_dir = %config.data_dir,
            purchase_timeout_ms = config.purchase_timeout_ms,
            cache_prefix = %config.cache_prefix,
            redis_configured = config.redis_url.is_some(),
            "Commerce service configured"
        );

        Ok(Self::new(store, wallet, cache, config))
    }

    #[cfg(all(feature = "rocksdb-backend", feature = "redis-cache"))]
    async fn cache_from_config(config: &CommerceConfig) -> Result<Arc<dyn Cache>, ServiceError> {
        match &config.redis_url {
            Some(url) => Ok(Arc::new(crate::cache::RedisCache::connect(url).await?)),
            None => {
                tracing::warn!("Redis not configured - using an in-process cache");
                Ok(Arc::new(MemoryCache::new()))
            }
        }
    }

    #[cfg(all(feature = "rocksdb-backend", not(feature = "redis-cache")))]
    #[allow(clippy::unused_async)]
    async fn cache_from_config(config: &CommerceConfig) -> Result<Arc<dyn Cache>, ServiceError> {
        if config.redis_url.is_some() {
            tracing::warn!("REDIS_URL set but the redis-cache feature is disabled");
        }
        Ok(Arc::new(MemoryCache::new()))
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The wallet.
    #[must_use]
    pub fn wallet(&self) -> &Arc<dyn Wallet> {
        &self.wallet
    }

    /// The cache coordinator.
    #[must_use]
    pub const fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &CommerceConfig {
        &self.config
    }

    pub(crate) fn purchase_timeout(&self) -> Duration {
        Duration::from_millis(self.config.purchase_timeout_ms)
    }
}

impl std::fmt::Debug for CommerceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommerceService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

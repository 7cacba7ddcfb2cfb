//! Read-cache invalidation.
//!
//! Content pages are cached outside this service under namespaced keys:
//!
//! - `{prefix}:bookstore:chapter:{chapter_id}`
//! - `{prefix}:bookstore:book_chapters:{book_id}`
//! - `{prefix}:bookstore:book_detail:{book_id}`
//!
//! After a purchase commits, [`CacheCoordinator`] drops the entries that may
//! carry stale ownership flags. Failures and slow backends are logged and
//! never reach the buyer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chapterhouse_core::{BookId, ChapterId};
use tokio::sync::Mutex;

/// Errors from a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend rejected or failed the command.
    #[error("cache backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "redis-cache")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A key-value cache that can drop entries.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Remove `key`. Removing a missing key succeeds.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

/// Renders cache keys under a namespace.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    /// Create keys under `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Key of a chapter page.
    #[must_use]
    pub fn chapter(&self, chapter_id: &ChapterId) -> String {
        format!("{}:bookstore:chapter:{chapter_id}", self.prefix)
    }

    /// Key of a book's chapter list.
    #[must_use]
    pub fn book_chapters(&self, book_id: &BookId) -> String {
        format!("{}:bookstore:book_chapters:{book_id}", self.prefix)
    }

    /// Key of a book's detail page.
    #[must_use]
    pub fn book_detail(&self, book_id: &BookId) -> String {
        format!("{}:bookstore:book_detail:{book_id}", self.prefix)
    }
}

/// What a committed purchase changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// A single chapter was bought.
    Chapter {
        /// The chapter.
        chapter_id: ChapterId,
        /// Its book.
        book_id: BookId,
    },
    /// Several chapters of one book were bought together.
    Batch {
        /// The book.
        book_id: BookId,
    },
    /// A whole book was bought.
    Book {
        /// The book.
        book_id: BookId,
    },
}

impl Invalidation {
    /// Keys to drop, in order.
    #[must_use]
    pub fn keys(&self, keys: &CacheKeys) -> Vec<String> {
        match self {
            Self::Chapter {
                chapter_id,
                book_id,
            } => vec![keys.chapter(chapter_id), keys.book_chapters(book_id)],
            Self::Batch { book_id } => vec![keys.book_chapters(book_id)],
            Self::Book { book_id } => vec![keys.book_detail(book_id), keys.book_chapters(book_id)],
        }
    }
}

/// Applies invalidation plans to a cache.
#[derive(Clone)]
pub struct CacheCoordinator {
    cache: Arc<dyn Cache>,
    keys: CacheKeys,
    timeout: Duration,
}

impl CacheCoordinator {
    /// Create a coordinator that waits at most `timeout` for one plan.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, keys: CacheKeys, timeout: Duration) -> Self {
        Self {
            cache,
            keys,
            timeout,
        }
    }

    /// The key renderer.
    #[must_use]
    pub const fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Drop every key of `plan`. Returns how many invalidations failed.
    ///
    /// If the backend does not answer within the timeout every key of the
    /// plan counts as failed and stale entries are left to expire.
    pub async fn invalidate(&self, plan: &Invalidation) -> usize {
        let keys = plan.keys(&self.keys);
        let pending = futures::future::join_all(keys.iter().map(|key| self.cache.invalidate(key)));

        let Ok(results) = tokio::time::timeout(self.timeout, pending).await else {
            tracing::warn!(
                keys = keys.len(),
                timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                "Cache invalidation timed out"
            );
            return keys.len();
        };

        let mut failures = 0;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                failures += 1;
                tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
            }
        }
        failures
    }
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Write an entry.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().await.insert(key.into(), value.into());
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(feature = "redis-cache")]
pub use self::redis_cache::RedisCache;

#[cfg(feature = "redis-cache")]
mod redis_cache {
    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::{AsyncCommands, Client};

    use super::{Cache, CacheError};

    /// Redis-backed cache.
    ///
    /// Clones share one `ConnectionManager`.
    #[derive(Clone)]
    pub struct RedisCache {
        conn_manager: ConnectionManager,
    }

    impl RedisCache {
        /// Connect to Redis.
        ///
        /// # Errors
        ///
        /// Returns an error if the URL is malformed or the server is unreachable.
        pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
            let client = Client::open(redis_url)?;
            let conn_manager = ConnectionManager::new(client).await?;

            tracing::info!("Redis cache connected");

            Ok(Self { conn_manager })
        }
    }

    #[async_trait]
    impl Cache for RedisCache {
        async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
            let mut conn = self.conn_manager.clone();
            conn.del::<_, ()>(key).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let keys = CacheKeys::new("prod");
        let chapter_id = ChapterId::generate();
        let book_id = BookId::generate();

        assert_eq!(
            keys.chapter(&chapter_id),
            format!("prod:bookstore:chapter:{chapter_id}")
        );
        assert_eq!(
            keys.book_chapters(&book_id),
            format!("prod:bookstore:book_chapters:{book_id}")
        );
        assert_eq!(
            keys.book_detail(&book_id),
            format!("prod:bookstore:book_detail:{book_id}")
        );
    }

    #[test]
    fn plans_per_purchase_kind() {
        let keys = CacheKeys::new("p");
        let chapter_id = ChapterId::generate();
        let book_id = BookId::generate();

        let chapter = Invalidation::Chapter {
            chapter_id,
            book_id,
        };
        assert_eq!(
            chapter.keys(&keys),
            vec![keys.chapter(&chapter_id), keys.book_chapters(&book_id)]
        );
        assert_eq!(
            Invalidation::Batch { book_id }.keys(&keys),
            vec![keys.book_chapters(&book_id)]
        );
        assert_eq!(
            Invalidation::Book { book_id }.keys(&keys),
            vec![keys.book_detail(&book_id), keys.book_chapters(&book_id)]
        );
    }

    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    struct StuckCache;

    #[async_trait]
    impl Cache for StuckCache {
        async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
            std::future::pending().await
        }
    }

    const SHORT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn failures_are_counted_not_raised() {
        let coordinator = CacheCoordinator::new(Arc::new(BrokenCache), CacheKeys::new("p"), SHORT);
        let failures = coordinator
            .invalidate(&Invalidation::Book {
                book_id: BookId::generate(),
            })
            .await;
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn stuck_backend_is_abandoned_after_timeout() {
        let coordinator = CacheCoordinator::new(Arc::new(StuckCache), CacheKeys::new("p"), SHORT);
        let plan = Invalidation::Chapter {
            chapter_id: ChapterId::generate(),
            book_id: BookId::generate(),
        };

        let failures = tokio::time::timeout(Duration::from_secs(5), coordinator.invalidate(&plan))
            .await
            .expect("coordinator gave up on the stuck backend");
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn memory_cache_drops_entries() {
        let cache = MemoryCache::new();
        cache.set("k", "v").await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        cache.invalidate("k").await.unwrap();
        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty().await);

        // Removing a missing key leaves nothing behind.
        cache.invalidate("k").await.unwrap();
        assert_eq!(cache.len().await, 0);
    }
}

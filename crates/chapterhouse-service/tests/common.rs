//! Common test utilities for chapterhouse integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;

use chapterhouse_core::{
    Book, BookId, BookPurchase, Chapter, ChapterId, ChapterPurchase, ChapterPurchaseBatch,
    OwnershipKey, UserId,
};
use chapterhouse_service::{
    telemetry, Cache, CacheError, CommerceConfig, CommerceService, MemoryCache,
};
#[cfg(feature = "rocksdb-backend")]
use chapterhouse_store::RocksStore;
use chapterhouse_store::{CommitSummary, LedgerTxn, MemoryStore, Store, StoreError};
use chapterhouse_wallet::{MemoryWallet, Wallet, WalletError, WalletReceipt};

/// Starting balance of the test user.
pub const STARTING_BALANCE: i64 = 10_000;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The service under test.
    pub service: CommerceService,
    /// The backing store, for seeding and inspection.
    pub store: Arc<dyn Store>,
    /// The in-process wallet behind any wrapper.
    pub wallet: Arc<MemoryWallet>,
    /// The cache, for inspecting invalidations.
    pub cache: Arc<RecordingCache>,
    /// A seeded book.
    pub book: Book,
    /// Its chapters: one free, then paid at 1.99, 2.99 and 3.99.
    pub chapters: Vec<Chapter>,
    /// A funded test user.
    pub user_id: UserId,
    /// Temporary directory for a `RocksDB` store (kept alive for test duration).
    pub _temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// A harness over an in-memory store.
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// A harness over a fresh `RocksDB` store.
    #[cfg(feature = "rocksdb-backend")]
    pub async fn rocks() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");
        let mut harness = Self::builder().store(Arc::new(store)).build().await;
        harness._temp_dir = Some(temp_dir);
        harness
    }

    /// Customize the collaborators.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// The free chapter.
    pub fn free_chapter(&self) -> &Chapter {
        &self.chapters[0]
    }

    /// The paid chapters, in sequence order.
    pub fn paid_chapters(&self) -> &[Chapter] {
        &self.chapters[1..]
    }

    /// The test user's wallet balance.
    pub async fn balance(&self) -> i64 {
        self.wallet
            .get_balance(&self.user_id)
            .await
            .expect("test user has a wallet")
    }

    /// Add a chapter to the seeded book.
    pub fn add_chapter(&self, chapter: &Chapter) {
        self.store.put_chapter(chapter).expect("Failed to add chapter");
    }

    /// Seed a second book with paid chapters at the given prices.
    pub fn seed_book(&self, title: &str, prices: &[i64]) -> (Book, Vec<Chapter>) {
        let book = Book::new(title, "Test Author");
        self.store.put_book(&book).expect("Failed to seed book");
        let chapters: Vec<Chapter> = prices
            .iter()
            .zip(1_u32..)
            .map(|(price, num)| Chapter::paid(book.id, num, format!("Chapter {num}"), *price))
            .collect();
        for chapter in &chapters {
            self.store.put_chapter(chapter).expect("Failed to seed chapter");
        }
        (book, chapters)
    }
}

/// Builder for a [`TestHarness`] with custom collaborators.
#[derive(Default)]
pub struct HarnessBuilder {
    store: Option<Arc<dyn Store>>,
    wallet_wrapper: Option<Box<dyn FnOnce(Arc<MemoryWallet>) -> Arc<dyn Wallet>>>,
    cache: Option<Arc<dyn Cache>>,
    balance: Option<i64>,
    config: Option<CommerceConfig>,
}

impl HarnessBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn balance(mut self, balance: i64) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn config(mut self, config: CommerceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the cache seen by the service (the harness cache is then unused).
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Wrap the in-memory wallet before handing it to the service.
    pub fn wrap_wallet(
        mut self,
        wrap: impl FnOnce(Arc<MemoryWallet>) -> Arc<dyn Wallet> + 'static,
    ) -> Self {
        self.wallet_wrapper = Some(Box::new(wrap));
        self
    }

    pub async fn build(self) -> TestHarness {
        telemetry::init_tracing();

        let store: Arc<dyn Store> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let wallet = Arc::new(MemoryWallet::new());
        let cache = Arc::new(RecordingCache::default());
        let service_cache: Arc<dyn Cache> = match self.cache {
            Some(cache) => cache,
            None => cache.clone(),
        };
        let service_wallet: Arc<dyn Wallet> = match self.wallet_wrapper {
            Some(wrap) => wrap(wallet.clone()),
            None => wallet.clone(),
        };

        let config = self.config.unwrap_or_else(|| CommerceConfig {
            cache_prefix: "test".into(),
            trial_chapters: 2,
            ..CommerceConfig::default()
        });

        let book = Book::new("The Hobbit", "J.R.R. Tolkien").with_cover("https://cdn/hobbit.png");
        let chapters = vec![
            Chapter::free(book.id, 1, "An Unexpected Party").with_word_count(5_000),
            Chapter::paid(book.id, 2, "Roast Mutton", 199).with_word_count(4_000),
            Chapter::paid(book.id, 3, "A Short Rest", 299).with_word_count(3_000),
            Chapter::paid(book.id, 4, "Over Hill and Under Hill", 399).with_word_count(2_000),
        ];
        store.put_book(&book).expect("Failed to seed book");
        for chapter in &chapters {
            store.put_chapter(chapter).expect("Failed to seed chapter");
        }

        let user_id = UserId::generate();
        wallet
            .set_balance(user_id, self.balance.unwrap_or(STARTING_BALANCE))
            .await;

        let service = CommerceService::new(store.clone(), service_wallet, service_cache, config);

        TestHarness {
            service,
            store,
            wallet,
            cache,
            book,
            chapters,
            user_id,
            _temp_dir: None,
        }
    }
}

// =============================================================================
// Fault-injecting collaborators
// =============================================================================

/// Store that can be told to fail commits or ledger reads.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    pub fail_commits: AtomicBool,
    pub fail_ledger_reads: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_ledger_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database("ledger unavailable".into()));
        }
        Ok(())
    }
}

impl Store for FaultyStore {
    fn put_book(&self, book: &Book) -> Result<(), StoreError> {
        self.inner.put_book(book)
    }

    fn get_book(&self, book_id: &BookId) -> Result<Option<Book>, StoreError> {
        self.inner.get_book(book_id)
    }

    fn put_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
        self.inner.put_chapter(chapter)
    }

    fn get_chapter(&self, chapter_id: &ChapterId) -> Result<Option<Chapter>, StoreError> {
        self.inner.get_chapter(chapter_id)
    }

    fn list_chapters(&self, book_id: &BookId) -> Result<Vec<Chapter>, StoreError> {
        self.inner.list_chapters(book_id)
    }

    fn get_chapter_purchase(
        &self,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> Result<Option<ChapterPurchase>, StoreError> {
        self.check_reads()?;
        self.inner.get_chapter_purchase(user_id, chapter_id)
    }

    fn get_book_purchase(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Option<BookPurchase>, StoreError> {
        self.check_reads()?;
        self.inner.get_book_purchase(user_id, book_id)
    }

    fn purchased_chapter_ids(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Vec<ChapterId>, StoreError> {
        self.check_reads()?;
        self.inner.purchased_chapter_ids(user_id, book_id)
    }

    fn list_chapter_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchase>, StoreError> {
        self.check_reads()?;
        self.inner.list_chapter_purchases(user_id, limit, offset)
    }

    fn list_book_chapter_purchases(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Vec<ChapterPurchase>, StoreError> {
        self.check_reads()?;
        self.inner.list_book_chapter_purchases(user_id, book_id)
    }

    fn list_batches(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchaseBatch>, StoreError> {
        self.check_reads()?;
        self.inner.list_batches(user_id, limit, offset)
    }

    fn list_book_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BookPurchase>, StoreError> {
        self.check_reads()?;
        self.inner.list_book_purchases(user_id, limit, offset)
    }

    fn total_spent_cents(&self, user_id: &UserId) -> Result<i64, StoreError> {
        self.check_reads()?;
        self.inner.total_spent_cents(user_id)
    }

    fn reserve(&self, keys: &[OwnershipKey]) -> Result<(), StoreError> {
        self.inner.reserve(keys)
    }

    fn release(&self, keys: &[OwnershipKey]) -> Result<(), StoreError> {
        self.inner.release(keys)
    }

    fn commit(&self, txn: LedgerTxn) -> Result<CommitSummary, StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database("disk full".into()));
        }
        self.inner.commit(txn)
    }
}

/// Wallet wrapper that can delay consumes and refuse refunds.
pub struct FaultyWallet {
    inner: Arc<MemoryWallet>,
    pub consume_delay: Duration,
    pub fail_refunds: bool,
}

impl FaultyWallet {
    pub fn slow(inner: Arc<MemoryWallet>, consume_delay: Duration) -> Self {
        Self {
            inner,
            consume_delay,
            fail_refunds: false,
        }
    }

    pub fn without_refunds(inner: Arc<MemoryWallet>) -> Self {
        Self {
            inner,
            consume_delay: Duration::ZERO,
            fail_refunds: true,
        }
    }
}

#[async_trait]
impl Wallet for FaultyWallet {
    async fn get_balance(&self, user_id: &UserId) -> Result<i64, WalletError> {
        self.inner.get_balance(user_id).await
    }

    async fn consume(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        if !self.consume_delay.is_zero() {
            tokio::time::sleep(self.consume_delay).await;
        }
        self.inner.consume(user_id, amount_cents, memo).await
    }

    async fn refund(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        if self.fail_refunds {
            return Err(WalletError::Api {
                code: "unavailable".into(),
                message: "refunds disabled".into(),
                status: 503,
            });
        }
        self.inner.refund(user_id, amount_cents, memo).await
    }
}

/// Cache whose every invalidation fails.
pub struct BrokenCache;

#[async_trait]
impl Cache for BrokenCache {
    async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

/// In-process cache that remembers every key it was asked to drop.
#[derive(Default)]
pub struct RecordingCache {
    inner: MemoryCache,
    invalidated: Mutex<Vec<String>>,
}

impl RecordingCache {
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.set(key, value).await;
    }

    /// Every key invalidated so far, oldest first.
    pub async fn invalidated_keys(&self) -> Vec<String> {
        self.invalidated.lock().await.clone()
    }
}

#[async_trait]
impl Cache for RecordingCache {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.invalidated.lock().await.push(key.to_string());
        self.inner.invalidate(key).await
    }
}

/// Cache whose invalidations never complete.
pub struct HangingCache;

#[async_trait]
impl Cache for HangingCache {
    async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
        std::future::pending().await
    }
}

//! Storage layer for chapterhouse.
//!
//! This crate holds the content catalog (books and chapters) and the purchase
//! ledger (chapter purchases, batch receipts and whole-book purchases).
//!
//! Two backends implement [`Store`]:
//!
//! - [`MemoryStore`]: process-local, used by tests and tooling
//! - [`RocksStore`]: `RocksDB` with column families for indexing (feature `rocksdb-backend`)
//!
//! # Ledger writes
//!
//! Purchases are written through [`transaction`], which stages rows in a
//! [`LedgerTxn`] and commits them as one atomic unit. Before charging a user,
//! callers [`Store::reserve`] the ledger keys they intend to write so that a
//! concurrent purchase of the same content is turned away early.
//!
//! # Example
//!
//! ```
//! use chapterhouse_core::{Book, Chapter, ChapterPurchase, UserId};
//! use chapterhouse_store::{transaction, MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let book = Book::new("Dune", "Frank Herbert");
//! let chapter = Chapter::paid(book.id, 1, "Desert", 299);
//! store.put_book(&book).unwrap();
//! store.put_chapter(&chapter).unwrap();
//!
//! let user_id = UserId::generate();
//! transaction(&store, |txn| {
//!     txn.insert_chapter_purchase(ChapterPurchase::paid(user_id, &chapter, &book));
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert!(store.has_chapter_purchase(&user_id, &chapter.id).unwrap());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;
pub mod txn;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;
pub use txn::{CommitSummary, LedgerTxn, LedgerWrite};

use chapterhouse_core::{
    Book, BookId, BookPurchase, Chapter, ChapterId, ChapterPurchase, ChapterPurchaseBatch,
    OwnershipKey, UserId,
};

/// The storage trait defining all catalog and ledger operations.
///
/// Implementations must be safe to share across threads. Ledger records are
/// only ever written through [`Store::commit`].
pub trait Store: Send + Sync {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Insert or update a book.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_book(&self, book: &Book) -> Result<()>;

    /// Get a book by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_book(&self, book_id: &BookId) -> Result<Option<Book>>;

    /// Insert or update a chapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRecord`] if the chapter violates a catalog
    /// invariant or its sequence number is taken by another chapter of the book.
    fn put_chapter(&self, chapter: &Chapter) -> Result<()>;

    /// Get a chapter by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chapter(&self, chapter_id: &ChapterId) -> Result<Option<Chapter>>;

    /// List the chapters of a book in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_chapters(&self, book_id: &BookId) -> Result<Vec<Chapter>>;

    /// List the paid chapters of a book in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_paid_chapters(&self, book_id: &BookId) -> Result<Vec<Chapter>> {
        let mut chapters = self.list_chapters(book_id)?;
        chapters.retain(|chapter| !chapter.is_free);
        Ok(chapters)
    }

    // =========================================================================
    // Ledger Reads
    // =========================================================================

    /// Get a user's purchase of one chapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chapter_purchase(
        &self,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> Result<Option<ChapterPurchase>>;

    /// Whether a user owns a chapter through a chapter purchase row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_chapter_purchase(&self, user_id: &UserId, chapter_id: &ChapterId) -> Result<bool> {
        Ok(self.get_chapter_purchase(user_id, chapter_id)?.is_some())
    }

    /// Get a user's whole-book purchase.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_book_purchase(&self, user_id: &UserId, book_id: &BookId)
        -> Result<Option<BookPurchase>>;

    /// Whether a user bought a whole book.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_book_purchase(&self, user_id: &UserId, book_id: &BookId) -> Result<bool> {
        Ok(self.get_book_purchase(user_id, book_id)?.is_some())
    }

    /// IDs of the chapters of a book the user holds purchase rows for.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn purchased_chapter_ids(&self, user_id: &UserId, book_id: &BookId) -> Result<Vec<ChapterId>>;

    /// List a user's chapter purchases, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_chapter_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchase>>;

    /// List a user's chapter purchases within one book, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_book_chapter_purchases(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Vec<ChapterPurchase>>;

    /// List a user's batch receipts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_batches(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchaseBatch>>;

    /// List a user's whole-book purchases, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_book_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BookPurchase>>;

    /// Total a user has spent: every chapter row plus every book purchase.
    ///
    /// Batch receipts are not counted; their charges are already carried by
    /// the chapter rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn total_spent_cents(&self, user_id: &UserId) -> Result<i64>;

    // =========================================================================
    // Ledger Writes
    // =========================================================================

    /// Claim ledger keys for a purchase that has not committed yet.
    ///
    /// All keys are claimed or none are.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if any key is already committed or
    /// claimed by another in-flight purchase.
    fn reserve(&self, keys: &[OwnershipKey]) -> Result<()>;

    /// Release keys claimed by [`Store::reserve`].
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation table is unavailable.
    fn release(&self, keys: &[OwnershipKey]) -> Result<()>;

    /// Atomically apply a set of staged ledger writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a strict write collides with an
    /// existing record; nothing is written in that case.
    fn commit(&self, txn: LedgerTxn) -> Result<CommitSummary>;
}

/// Run `f` against a fresh [`LedgerTxn`] and commit what it staged.
///
/// If `f` fails, nothing is written.
///
/// # Errors
///
/// Returns the error from `f`, or from the commit.
pub fn transaction<S, T, F>(store: &S, f: F) -> Result<T>
where
    S: Store + ?Sized,
    F: FnOnce(&mut LedgerTxn) -> Result<T>,
{
    let mut txn = LedgerTxn::new();
    let value = f(&mut txn)?;
    let summary = store.commit(txn)?;

    tracing::debug!(
        written = summary.written,
        skipped_grants = summary.skipped_grants,
        "Ledger transaction committed"
    );

    Ok(value)
}

/// Apply `limit`/`offset` to an iterator that is already newest first.
pub(crate) fn page<T>(items: impl Iterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    items.skip(offset).take(limit).collect()
}

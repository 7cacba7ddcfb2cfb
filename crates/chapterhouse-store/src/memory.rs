//! In-memory storage implementation.
//!
//! Records live in insertion order, so "newest first" listings walk the
//! vectors backwards.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chapterhouse_core::{
    Book, BookId, BookPurchase, Chapter, ChapterId, ChapterPurchase, ChapterPurchaseBatch,
    OwnershipKey, UserId,
};

use crate::error::{Result, StoreError};
use crate::txn::{CommitSummary, InFlight, LedgerTxn, LedgerWrite};
use crate::{page, Store};

#[derive(Debug, Default)]
struct MemoryState {
    books: HashMap<BookId, Book>,
    chapters: HashMap<ChapterId, Chapter>,
    chapter_purchases: Vec<ChapterPurchase>,
    chapter_index: HashMap<(UserId, ChapterId), usize>,
    batches: Vec<ChapterPurchaseBatch>,
    book_purchases: Vec<BookPurchase>,
    book_index: HashMap<(UserId, BookId), usize>,
}

impl MemoryState {
    fn key_exists(&self, key: &OwnershipKey) -> bool {
        match key {
            OwnershipKey::Chapter {
                user_id,
                chapter_id,
            } => self.chapter_index.contains_key(&(*user_id, *chapter_id)),
            OwnershipKey::Book { user_id, book_id } => {
                self.book_index.contains_key(&(*user_id, *book_id))
            }
        }
    }

    fn apply(&mut self, write: LedgerWrite) {
        match write {
            LedgerWrite::ChapterPurchase(row) | LedgerWrite::Grant(row) => {
                self.chapter_index
                    .insert((row.user_id, row.chapter_id), self.chapter_purchases.len());
                self.chapter_purchases.push(row);
            }
            LedgerWrite::Batch(batch) => self.batches.push(batch),
            LedgerWrite::BookPurchase(purchase) => {
                self.book_index
                    .insert((purchase.user_id, purchase.book_id), self.book_purchases.len());
                self.book_purchases.push(purchase);
            }
        }
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    in_flight: InFlight,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::poisoned())
    }
}

impl Store for MemoryStore {
    fn put_book(&self, book: &Book) -> Result<()> {
        self.write()?.books.insert(book.id, book.clone());
        Ok(())
    }

    fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        Ok(self.read()?.books.get(book_id).cloned())
    }

    fn put_chapter(&self, chapter: &Chapter) -> Result<()> {
        chapter
            .validate()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let mut state = self.write()?;
        let taken = state.chapters.values().any(|other| {
            other.book_id == chapter.book_id
                && other.chapter_num == chapter.chapter_num
                && other.id != chapter.id
        });
        if taken {
            return Err(StoreError::InvalidRecord(format!(
                "chapter number {} already used in book {}",
                chapter.chapter_num, chapter.book_id
            )));
        }

        state.chapters.insert(chapter.id, chapter.clone());
        Ok(())
    }

    fn get_chapter(&self, chapter_id: &ChapterId) -> Result<Option<Chapter>> {
        Ok(self.read()?.chapters.get(chapter_id).cloned())
    }

    fn list_chapters(&self, book_id: &BookId) -> Result<Vec<Chapter>> {
        let mut chapters: Vec<_> = self
            .read()?
            .chapters
            .values()
            .filter(|chapter| chapter.book_id == *book_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|chapter| chapter.chapter_num);
        Ok(chapters)
    }

    fn get_chapter_purchase(
        &self,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> Result<Option<ChapterPurchase>> {
        let state = self.read()?;
        Ok(state
            .chapter_index
            .get(&(*user_id, *chapter_id))
            .and_then(|idx| state.chapter_purchases.get(*idx))
            .cloned())
    }

    fn get_book_purchase(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Option<BookPurchase>> {
        let state = self.read()?;
        Ok(state
            .book_index
            .get(&(*user_id, *book_id))
            .and_then(|idx| state.book_purchases.get(*idx))
            .cloned())
    }

    fn purchased_chapter_ids(&self, user_id: &UserId, book_id: &BookId) -> Result<Vec<ChapterId>> {
        Ok(self
            .list_book_chapter_purchases(user_id, book_id)?
            .into_iter()
            .map(|row| row.chapter_id)
            .collect())
    }

    fn list_chapter_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchase>> {
        let state = self.read()?;
        let rows = state
            .chapter_purchases
            .iter()
            .rev()
            .filter(|row| row.user_id == *user_id)
            .cloned();
        Ok(page(rows, limit, offset))
    }

    fn list_book_chapter_purchases(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Vec<ChapterPurchase>> {
        let mut rows: Vec<_> = self
            .read()?
            .chapter_purchases
            .iter()
            .filter(|row| row.user_id == *user_id && row.book_id == *book_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.chapter_num);
        Ok(rows)
    }

    fn list_batches(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchaseBatch>> {
        let state = self.read()?;
        let batches = state
            .batches
            .iter()
            .rev()
            .filter(|batch| batch.user_id == *user_id)
            .cloned();
        Ok(page(batches, limit, offset))
    }

    fn list_book_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BookPurchase>> {
        let state = self.read()?;
        let purchases = state
            .book_purchases
            .iter()
            .rev()
            .filter(|purchase| purchase.user_id == *user_id)
            .cloned();
        Ok(page(purchases, limit, offset))
    }

    fn total_spent_cents(&self, user_id: &UserId) -> Result<i64> {
        let state = self.read()?;
        let chapters: i64 = state
            .chapter_purchases
            .iter()
            .filter(|row| row.user_id == *user_id)
            .map(|row| row.price_cents)
            .sum();
        let books: i64 = state
            .book_purchases
            .iter()
            .filter(|purchase| purchase.user_id == *user_id)
            .map(|purchase| purchase.total_price_cents)
            .sum();
        Ok(chapters + books)
    }

    fn reserve(&self, keys: &[OwnershipKey]) -> Result<()> {
        self.in_flight
            .reserve(keys, |key| Ok(self.read()?.key_exists(key)))
    }

    fn release(&self, keys: &[OwnershipKey]) -> Result<()> {
        self.in_flight.release(keys)
    }

    fn commit(&self, txn: LedgerTxn) -> Result<CommitSummary> {
        let _commit_lock = self.in_flight.lock()?;
        let mut state = self.write()?;

        let (writes, summary) = txn
            .resolve(|key| Ok(state.key_exists(key)))?
            .into_parts();
        for write in writes {
            state.apply(write);
        }
        Ok(summary)
    }
}

//! Purchase history queries.

use chapterhouse_core::{
    BookId, BookPurchase, ChapterId, ChapterPurchase, ChapterPurchaseBatch, Result, UserId,
};
use serde::Serialize;

use crate::CommerceService;

/// Page size used when the caller does not give one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// A user's purchases across every kind of record.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseHistory {
    /// Chapter rows, newest first.
    pub chapter_purchases: Vec<ChapterPurchase>,

    /// Batch receipts, newest first.
    pub batches: Vec<ChapterPurchaseBatch>,

    /// Whole-book purchases, newest first.
    pub book_purchases: Vec<BookPurchase>,

    /// Everything the user has spent, across all pages.
    pub total_spent_cents: i64,
}

/// Clamp a requested page size to `1..=MAX_PAGE_SIZE`.
#[must_use]
pub fn page_size(limit: Option<usize>) -> usize {
    match limit {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(limit) => limit.min(MAX_PAGE_SIZE),
    }
}

impl CommerceService {
    /// A user's chapter purchases, newest first.
    ///
    /// # Errors
    ///
    /// Returns `TransientStore` if the ledger cannot be read.
    pub fn chapter_purchases(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<ChapterPurchase>> {
        Ok(self
            .store
            .list_chapter_purchases(user_id, page_size(limit), offset)?)
    }

    /// A user's chapter purchases within one book, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns `TransientStore` if the ledger cannot be read.
    pub fn book_chapter_purchases(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Vec<ChapterPurchase>> {
        Ok(self.store.list_book_chapter_purchases(user_id, book_id)?)
    }

    /// IDs of the chapters of a book the user holds purchase rows for.
    ///
    /// # Errors
    ///
    /// Returns `TransientStore` if the ledger cannot be read.
    pub fn purchased_chapter_ids(&self, user_id: &UserId, book_id: &BookId) -> Result<Vec<ChapterId>> {
        Ok(self.store.purchased_chapter_ids(user_id, book_id)?)
    }

    /// One page of each purchase kind, plus the user's lifetime spend.
    ///
    /// # Errors
    ///
    /// Returns `TransientStore` if the ledger cannot be read.
    pub fn purchase_history(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<PurchaseHistory> {
        let limit = page_size(limit);

        Ok(PurchaseHistory {
            chapter_purchases: self.store.list_chapter_purchases(user_id, limit, offset)?,
            batches: self.store.list_batches(user_id, limit, offset)?,
            book_purchases: self.store.list_book_purchases(user_id, limit, offset)?,
            total_spent_cents: self.store.total_spent_cents(user_id)?,
        })
    }
}

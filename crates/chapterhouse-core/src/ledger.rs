//! Purchase ledger records.
//!
//! The ledger is append-only. A [`ChapterPurchase`] is the source of truth for
//! chapter ownership, a [`ChapterPurchaseBatch`] is a receipt grouping the rows
//! of one multi-chapter purchase, and a [`BookPurchase`] grants the whole book.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Book, BookId, Chapter, ChapterId, PurchaseId, UserId};

/// Ownership of a single chapter by a user.
///
/// At most one exists per `(user_id, chapter_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPurchase {
    /// Record identifier.
    pub id: PurchaseId,

    /// The buyer.
    pub user_id: UserId,

    /// The purchased chapter.
    pub chapter_id: ChapterId,

    /// Book of the chapter.
    pub book_id: BookId,

    /// Price paid in minor units. Zero for rows granted by a whole-book purchase.
    pub price_cents: i64,

    /// When the purchase committed.
    pub purchased_at: DateTime<Utc>,

    /// Chapter title at purchase time.
    pub chapter_title: String,

    /// Chapter sequence number at purchase time.
    pub chapter_num: u32,

    /// Book title at purchase time.
    pub book_title: String,

    /// Book cover at purchase time.
    pub book_cover_url: Option<String>,

    /// Wallet receipt of the charge that paid for this row, if any.
    pub receipt_id: Option<String>,
}

impl ChapterPurchase {
    /// Build a paid row for `chapter` at its current price.
    #[must_use]
    pub fn paid(user_id: UserId, chapter: &Chapter, book: &Book) -> Self {
        Self {
            id: PurchaseId::generate(),
            user_id,
            chapter_id: chapter.id,
            book_id: chapter.book_id,
            price_cents: chapter.price_cents,
            purchased_at: Utc::now(),
            chapter_title: chapter.title.clone(),
            chapter_num: chapter.chapter_num,
            book_title: book.title.clone(),
            book_cover_url: book.cover_url.clone(),
            receipt_id: None,
        }
    }

    /// Build the zero-price row that a whole-book purchase grants for `chapter`.
    #[must_use]
    pub fn granted(user_id: UserId, chapter: &Chapter, book: &Book) -> Self {
        Self {
            price_cents: 0,
            ..Self::paid(user_id, chapter, book)
        }
    }

    /// The ledger uniqueness key of this row.
    #[must_use]
    pub const fn ownership_key(&self) -> OwnershipKey {
        OwnershipKey::Chapter {
            user_id: self.user_id,
            chapter_id: self.chapter_id,
        }
    }
}

/// Receipt for a multi-chapter purchase.
///
/// Ownership is still carried by the individual [`ChapterPurchase`] rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPurchaseBatch {
    /// Record identifier.
    pub id: PurchaseId,

    /// The buyer.
    pub user_id: UserId,

    /// Book all chapters belong to.
    pub book_id: BookId,

    /// Chapters charged in this batch, in request order.
    pub chapter_ids: Vec<ChapterId>,

    /// Total charged in minor units.
    pub total_price_cents: i64,

    /// Number of chapters charged.
    pub chapters_count: usize,

    /// When the batch committed.
    pub purchased_at: DateTime<Utc>,

    /// Book title at purchase time.
    pub book_title: String,

    /// Book cover at purchase time.
    pub book_cover_url: Option<String>,

    /// Wallet receipt of the single charge.
    pub receipt_id: Option<String>,
}

/// Whole-book ownership.
///
/// At most one exists per `(user_id, book_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPurchase {
    /// Record identifier.
    pub id: PurchaseId,

    /// The buyer.
    pub user_id: UserId,

    /// The purchased book.
    pub book_id: BookId,

    /// Amount charged (discounted) in minor units.
    pub total_price_cents: i64,

    /// Sum of paid chapter prices before the discount.
    pub original_price_cents: i64,

    /// Discount in basis points of the original price (2000 = 20% off).
    pub discount_bps: u32,

    /// Paid chapters in the book when it was bought.
    pub chapter_count: usize,

    /// When the purchase committed.
    pub purchased_at: DateTime<Utc>,

    /// Book title at purchase time.
    pub book_title: String,

    /// Book cover at purchase time.
    pub book_cover_url: Option<String>,

    /// Wallet receipt of the charge.
    pub receipt_id: Option<String>,
}

impl BookPurchase {
    /// The ledger uniqueness key of this record.
    #[must_use]
    pub const fn ownership_key(&self) -> OwnershipKey {
        OwnershipKey::Book {
            user_id: self.user_id,
            book_id: self.book_id,
        }
    }
}

/// A ledger uniqueness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipKey {
    /// One purchase per user and chapter.
    Chapter {
        /// The buyer.
        user_id: UserId,
        /// The chapter.
        chapter_id: ChapterId,
    },
    /// One whole-book purchase per user and book.
    Book {
        /// The buyer.
        user_id: UserId,
        /// The book.
        book_id: BookId,
    },
}

impl OwnershipKey {
    /// Kind of content the key guards.
    #[must_use]
    pub const fn entity(&self) -> &'static str {
        match self {
            Self::Chapter { .. } => "chapter",
            Self::Book { .. } => "book",
        }
    }

    /// Identifier of the guarded content.
    #[must_use]
    pub fn content_id(&self) -> String {
        match self {
            Self::Chapter { chapter_id, .. } => chapter_id.to_string(),
            Self::Book { book_id, .. } => book_id.to_string(),
        }
    }
}

impl std::fmt::Display for OwnershipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chapter {
                user_id,
                chapter_id,
            } => write!(f, "chapter:{user_id}:{chapter_id}"),
            Self::Book { user_id, book_id } => write!(f, "book:{user_id}:{book_id}"),
        }
    }
}

/// Why a requested chapter was left out of a batch charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The chapter is free.
    Free,
    /// The user already owns the chapter.
    AlreadyOwned,
}

/// A requested chapter that was not charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedChapter {
    /// The chapter.
    pub chapter_id: ChapterId,
    /// Why it was skipped.
    pub reason: SkipReason,
}

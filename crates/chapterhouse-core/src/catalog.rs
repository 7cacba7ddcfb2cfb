//! Catalog records: books, chapters and the display catalog built from them.
//!
//! Books and chapters are owned by content management; this crate only reads
//! them. Prices are integer minor units (`price_cents`), never floats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookId, ChapterId};

/// A book in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Book identifier.
    pub id: BookId,

    /// Display title.
    pub title: String,

    /// Author display name.
    pub author: String,

    /// Cover image URL, copied onto purchase records for display.
    pub cover_url: Option<String>,

    /// When the book was created.
    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Create a book with no cover.
    #[must_use]
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: BookId::generate(),
            title: title.into(),
            author: author.into(),
            cover_url: None,
            created_at: Utc::now(),
        }
    }

    /// Set the cover URL.
    #[must_use]
    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }
}

/// A chapter of a book.
///
/// A free chapter always has `price_cents == 0`; see [`Chapter::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter identifier.
    pub id: ChapterId,

    /// Owning book.
    pub book_id: BookId,

    /// Display title.
    pub title: String,

    /// Sequence number within the book, starting at 1.
    pub chapter_num: u32,

    /// Number of words in the chapter body.
    pub word_count: u64,

    /// Whether the chapter can be read without purchase.
    pub is_free: bool,

    /// Price in minor units (cents).
    pub price_cents: i64,

    /// Publication time; `None` while the chapter is a draft.
    pub published_at: Option<DateTime<Utc>>,
}

impl Chapter {
    /// Create a published paid chapter.
    #[must_use]
    pub fn paid(book_id: BookId, chapter_num: u32, title: impl Into<String>, price_cents: i64) -> Self {
        Self {
            id: ChapterId::generate(),
            book_id,
            title: title.into(),
            chapter_num,
            word_count: 0,
            is_free: false,
            price_cents,
            published_at: Some(Utc::now()),
        }
    }

    /// Create a published free chapter.
    #[must_use]
    pub fn free(book_id: BookId, chapter_num: u32, title: impl Into<String>) -> Self {
        Self {
            is_free: true,
            price_cents: 0,
            ..Self::paid(book_id, chapter_num, title, 0)
        }
    }

    /// Set the word count.
    #[must_use]
    pub fn with_word_count(mut self, word_count: u64) -> Self {
        self.word_count = word_count;
        self
    }

    /// Whether the chapter has been published.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published_at.is_some_and(|at| at <= Utc::now())
    }

    /// Check the record-level invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ChapterInvariantError> {
        if self.chapter_num == 0 {
            return Err(ChapterInvariantError::ZeroSequence);
        }
        if self.price_cents < 0 {
            return Err(ChapterInvariantError::NegativePrice(self.price_cents));
        }
        if self.is_free && self.price_cents != 0 {
            return Err(ChapterInvariantError::PricedFreeChapter(self.price_cents));
        }
        Ok(())
    }
}

/// A chapter record that breaks a catalog invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChapterInvariantError {
    /// Sequence numbers start at 1.
    #[error("chapter number must be positive")]
    ZeroSequence,

    /// Prices are non-negative minor units.
    #[error("chapter price must not be negative: {0}")]
    NegativePrice(i64),

    /// Free chapters carry no price.
    #[error("free chapter must have zero price, got {0}")]
    PricedFreeChapter(i64),
}

/// Display-ready chapter list for a book.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterCatalog {
    /// The book.
    pub book_id: BookId,

    /// Book title.
    pub book_title: String,

    /// Number of chapters in the book.
    pub total_chapters: usize,

    /// Number of free chapters.
    pub free_chapters: usize,

    /// Number of paid chapters.
    pub paid_chapters: usize,

    /// Sum of all chapter word counts.
    pub total_word_count: u64,

    /// How many leading chapters are offered as a trial.
    pub trial_count: usize,

    /// Whether the viewer owns the whole book. Always `false` for anonymous viewers.
    pub book_owned: bool,

    /// Chapters in sequence order.
    pub chapters: Vec<CatalogEntry>,
}

/// One row of a [`ChapterCatalog`].
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    /// Chapter identifier.
    pub chapter_id: ChapterId,
    /// Chapter title.
    pub title: String,
    /// Sequence number.
    pub chapter_num: u32,
    /// Word count.
    pub word_count: u64,
    /// Free flag.
    pub is_free: bool,
    /// Price in minor units.
    pub price_cents: i64,
    /// Publication time.
    pub published_at: Option<DateTime<Utc>>,
    /// Whether the chapter is published.
    pub is_published: bool,
    /// Purchase flag for the viewer; `None` for anonymous viewers.
    pub is_purchased: Option<bool>,
}

impl CatalogEntry {
    /// Build an entry from a chapter and the viewer's purchase flag.
    #[must_use]
    pub fn from_chapter(chapter: &Chapter, is_purchased: Option<bool>) -> Self {
        Self {
            chapter_id: chapter.id,
            title: chapter.title.clone(),
            chapter_num: chapter.chapter_num,
            word_count: chapter.word_count,
            is_free: chapter.is_free,
            price_cents: chapter.price_cents,
            published_at: chapter.published_at,
            is_published: chapter.is_published(),
            is_purchased,
        }
    }
}

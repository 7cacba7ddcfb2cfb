//! Catalog reads and price queries.

use std::collections::HashSet;

use chapterhouse_core::pricing::{self, BookQuote};
use chapterhouse_core::{
    Book, BookId, CatalogEntry, Chapter, ChapterCatalog, ChapterId, CommerceError, Result, Viewer,
};

use crate::CommerceService;

impl CommerceService {
    /// Build the display-ready chapter list of a book for `viewer`.
    ///
    /// Purchase flags are `None` for anonymous viewers. If the viewer's
    /// purchases cannot be read the catalog is still returned, with flags
    /// reflecting only what could be read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown book and `TransientStore` if the
    /// catalog itself cannot be read.
    pub fn get_chapter_catalog(&self, viewer: Viewer, book_id: &BookId) -> Result<ChapterCatalog> {
        let book = self.require_book(book_id)?;
        let chapters = self.store.list_chapters(book_id)?;

        let (book_owned, purchased) = match viewer.user_id() {
            None => (false, None),
            Some(user_id) => {
                let book_owned = self
                    .store
                    .has_book_purchase(&user_id, book_id)
                    .unwrap_or_else(|e| {
                        tracing::warn!(
                            user_id = %user_id,
                            book_id = %book_id,
                            error = %e,
                            "Book ownership lookup failed"
                        );
                        false
                    });
                let purchased: HashSet<ChapterId> = self
                    .store
                    .purchased_chapter_ids(&user_id, book_id)
                    .unwrap_or_else(|e| {
                        tracing::warn!(
                            user_id = %user_id,
                            book_id = %book_id,
                            error = %e,
                            "Purchased chapter lookup failed"
                        );
                        Vec::new()
                    })
                    .into_iter()
                    .collect();
                (book_owned, Some(purchased))
            }
        };

        let entries = chapters
            .iter()
            .map(|chapter| {
                let is_purchased = purchased
                    .as_ref()
                    .map(|ids| book_owned || ids.contains(&chapter.id));
                CatalogEntry::from_chapter(chapter, is_purchased)
            })
            .collect();

        let free_chapters = chapters.iter().filter(|c| c.is_free).count();

        Ok(ChapterCatalog {
            book_id: book.id,
            book_title: book.title,
            total_chapters: chapters.len(),
            free_chapters,
            paid_chapters: chapters.len() - free_chapters,
            total_word_count: chapters.iter().map(|c| c.word_count).sum(),
            trial_count: select_trial(&chapters, self.config.trial_chapters).len(),
            book_owned,
            chapters: entries,
        })
    }

    /// Chapters offered as a trial: free chapters in sequence order, padded
    /// with the earliest paid chapters up to `count`.
    ///
    /// `None` or zero uses the configured default.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown book.
    pub fn trial_chapters(&self, book_id: &BookId, count: Option<usize>) -> Result<Vec<Chapter>> {
        self.require_book(book_id)?;
        let chapters = self.store.list_chapters(book_id)?;
        let count = match count {
            None | Some(0) => self.config.trial_chapters,
            Some(count) => count,
        };

        Ok(select_trial(&chapters, count)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Current price of a chapter in minor units. Free chapters cost zero.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown chapter.
    pub fn chapter_price(&self, chapter_id: &ChapterId) -> Result<i64> {
        let chapter = self.require_chapter(chapter_id)?;
        Ok(pricing::chapter_price(&chapter))
    }

    /// Quote a whole-book purchase without buying it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown book.
    pub fn quote_book(&self, book_id: &BookId) -> Result<BookQuote> {
        self.require_book(book_id)?;
        let chapters = self.store.list_paid_chapters(book_id)?;
        Ok(pricing::quote_book(&chapters))
    }

    pub(crate) fn require_book(&self, book_id: &BookId) -> Result<Book> {
        self.store
            .get_book(book_id)?
            .ok_or_else(|| CommerceError::book_not_found(book_id))
    }

    pub(crate) fn require_chapter(&self, chapter_id: &ChapterId) -> Result<Chapter> {
        self.store
            .get_chapter(chapter_id)?
            .ok_or_else(|| CommerceError::chapter_not_found(chapter_id))
    }
}

/// Pick trial chapters from a sequence-ordered list, keeping sequence order.
fn select_trial(chapters: &[Chapter], count: usize) -> Vec<&Chapter> {
    let free = chapters.iter().filter(|c| c.is_free).take(count);
    let mut trial: Vec<&Chapter> = free.collect();

    let missing = count.saturating_sub(trial.len());
    trial.extend(chapters.iter().filter(|c| !c.is_free).take(missing));
    trial.sort_by_key(|c| c.chapter_num);
    trial
}

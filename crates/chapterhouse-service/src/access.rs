//! Access evaluation.

use chapterhouse_core::{
    AccessDecision, Chapter, ChapterAccess, ChapterId, CommerceError, Result, Viewer,
};

use crate::CommerceService;

impl CommerceService {
    /// Decide whether `viewer` may read a chapter.
    ///
    /// Checked in priority order: free chapter, a chapter purchase row, a
    /// whole-book purchase. Anonymous viewers only ever get free chapters.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown chapter and `TransientStore` if the
    /// ledger cannot be read.
    pub fn check_chapter_access(
        &self,
        viewer: Viewer,
        chapter_id: &ChapterId,
    ) -> Result<ChapterAccess> {
        let chapter = self
            .store
            .get_chapter(chapter_id)?
            .ok_or_else(|| CommerceError::chapter_not_found(chapter_id))?;

        let decision = self.decide(viewer, &chapter)?;

        tracing::debug!(
            chapter_id = %chapter_id,
            user_id = ?viewer.user_id(),
            reason = decision.reason(),
            "Chapter access evaluated"
        );

        Ok(ChapterAccess::new(&chapter, decision))
    }

    /// Whether `viewer` may read a chapter.
    ///
    /// # Errors
    ///
    /// Same as [`CommerceService::check_chapter_access`].
    pub fn can_access_chapter(&self, viewer: Viewer, chapter_id: &ChapterId) -> Result<bool> {
        Ok(self.check_chapter_access(viewer, chapter_id)?.can_access())
    }

    pub(crate) fn decide(&self, viewer: Viewer, chapter: &Chapter) -> Result<AccessDecision> {
        if chapter.is_free {
            return Ok(AccessDecision::Free);
        }

        let Some(user_id) = viewer.user_id() else {
            return Ok(AccessDecision::Denied);
        };

        if let Some(purchase) = self.store.get_chapter_purchase(&user_id, &chapter.id)? {
            return Ok(AccessDecision::Purchased {
                purchased_at: purchase.purchased_at,
            });
        }

        if self.store.has_book_purchase(&user_id, &chapter.book_id)? {
            return Ok(AccessDecision::BookOwned);
        }

        Ok(AccessDecision::Denied)
    }
}

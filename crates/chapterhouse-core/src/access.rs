//! Access decision types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Chapter, ChapterId, UserId};

/// Who is asking to read.
///
/// Ledger lookups need a [`UserId`], which only an authenticated viewer has, so
/// an anonymous viewer can only ever be granted free content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// Not signed in.
    Anonymous,
    /// A signed-in reader.
    Authenticated(UserId),
}

impl Viewer {
    /// The user id, if authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user_id) => Some(*user_id),
        }
    }
}

impl From<Option<UserId>> for Viewer {
    fn from(user_id: Option<UserId>) -> Self {
        user_id.map_or(Self::Anonymous, Self::Authenticated)
    }
}

impl From<UserId> for Viewer {
    fn from(user_id: UserId) -> Self {
        Self::Authenticated(user_id)
    }
}

/// Outcome of evaluating a viewer against a chapter, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    /// The chapter is free.
    Free,

    /// The viewer bought the chapter (directly, in a batch, or via a book grant row).
    Purchased {
        /// When the purchase committed.
        purchased_at: DateTime<Utc>,
    },

    /// The viewer owns the whole book but has no row for this chapter.
    #[serde(rename = "purchased_book")]
    BookOwned,

    /// No access.
    Denied,
}

impl AccessDecision {
    /// Whether the chapter may be read.
    #[must_use]
    pub const fn can_access(&self) -> bool {
        !matches!(self, Self::Denied)
    }

    /// Whether access comes from a purchase of any kind.
    #[must_use]
    pub const fn is_purchased(&self) -> bool {
        matches!(self, Self::Purchased { .. } | Self::BookOwned)
    }

    /// Short reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Purchased { .. } => "purchased",
            Self::BookOwned => "purchased_book",
            Self::Denied => "denied",
        }
    }

    /// Purchase time, when access comes from a chapter purchase row.
    #[must_use]
    pub const fn purchased_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Purchased { purchased_at } => Some(*purchased_at),
            _ => None,
        }
    }
}

/// Access information for one chapter.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterAccess {
    /// The chapter.
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
    /// The decision.
    pub decision: AccessDecision,
}

impl ChapterAccess {
    /// Attach a decision to a chapter.
    #[must_use]
    pub fn new(chapter: &Chapter, decision: AccessDecision) -> Self {
        Self {
            chapter_id: chapter.id,
            title: chapter.title.clone(),
            chapter_num: chapter.chapter_num,
            word_count: chapter.word_count,
            is_free: chapter.is_free,
            price_cents: chapter.price_cents,
            decision,
        }
    }

    /// Whether the chapter may be read.
    #[must_use]
    pub const fn can_access(&self) -> bool {
        self.decision.can_access()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_denied_blocks_access() {
        let now = Utc::now();
        assert!(AccessDecision::Free.can_access());
        assert!(AccessDecision::Purchased { purchased_at: now }.can_access());
        assert!(AccessDecision::BookOwned.can_access());
        assert!(!AccessDecision::Denied.can_access());
    }

    #[test]
    fn reasons_match_wire_names() {
        assert_eq!(AccessDecision::Free.reason(), "free");
        assert_eq!(AccessDecision::BookOwned.reason(), "purchased_book");
        let json = serde_json::to_value(AccessDecision::BookOwned).unwrap();
        assert_eq!(json["reason"], "purchased_book");
    }

    #[test]
    fn missing_user_is_anonymous() {
        assert_eq!(Viewer::from(None), Viewer::Anonymous);
        let user_id = UserId::generate();
        assert_eq!(Viewer::from(Some(user_id)).user_id(), Some(user_id));
    }
}

//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Book records, keyed by `book_id`.
    pub const BOOKS: &str = "books";

    /// Chapter records, keyed by `chapter_id`.
    pub const CHAPTERS: &str = "chapters";

    /// Index: chapters of a book, keyed by `book_id || chapter_num (BE u32) || chapter_id`.
    /// Value is empty (index only).
    pub const CHAPTERS_BY_BOOK: &str = "chapters_by_book";

    /// Chapter purchases, keyed by `user_id || chapter_id`.
    ///
    /// The key doubles as the one-purchase-per-chapter uniqueness constraint.
    pub const CHAPTER_PURCHASES: &str = "chapter_purchases";

    /// Index: chapter purchases in commit order, keyed by `user_id || purchase_id`.
    /// Value is the `chapter_id`.
    pub const CHAPTER_PURCHASES_BY_USER: &str = "chapter_purchases_by_user";

    /// Index: chapter purchases per book, keyed by `user_id || book_id || chapter_id`.
    /// Value is empty (index only).
    pub const CHAPTER_PURCHASES_BY_BOOK: &str = "chapter_purchases_by_book";

    /// Batch receipts, keyed by `user_id || batch_id` (ULID).
    pub const PURCHASE_BATCHES: &str = "purchase_batches";

    /// Whole-book purchases, keyed by `user_id || book_id`.
    pub const BOOK_PURCHASES: &str = "book_purchases";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::BOOKS,
        cf::CHAPTERS,
        cf::CHAPTERS_BY_BOOK,
        cf::CHAPTER_PURCHASES,
        cf::CHAPTER_PURCHASES_BY_USER,
        cf::CHAPTER_PURCHASES_BY_BOOK,
        cf::PURCHASE_BATCHES,
        cf::BOOK_PURCHASES,
    ]
}

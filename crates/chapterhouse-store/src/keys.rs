//! Key encoding utilities for `RocksDB`.
//!
//! Composite keys are plain byte concatenations of fixed-width ids, so every
//! per-user or per-book listing is a prefix scan.

use chapterhouse_core::{BookId, ChapterId, PurchaseId, UserId};

const ID_LEN: usize = 16;

/// Create a book key.
#[must_use]
pub fn book_key(book_id: &BookId) -> Vec<u8> {
    book_id.as_bytes().to_vec()
}

/// Create a chapter key.
#[must_use]
pub fn chapter_key(chapter_id: &ChapterId) -> Vec<u8> {
    chapter_id.as_bytes().to_vec()
}

/// Create a book-chapter index key.
///
/// Format: `book_id (16) || chapter_num (4, big-endian) || chapter_id (16)`
///
/// Big-endian sequence numbers make a prefix scan return chapters in reading order.
#[must_use]
pub fn book_chapter_key(book_id: &BookId, chapter_num: u32, chapter_id: &ChapterId) -> Vec<u8> {
    let mut key = book_chapter_num_prefix(book_id, chapter_num);
    key.extend_from_slice(chapter_id.as_bytes());
    key
}

/// Prefix matching every index entry of one sequence number in a book.
#[must_use]
pub fn book_chapter_num_prefix(book_id: &BookId, chapter_num: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN + 4);
    key.extend_from_slice(book_id.as_bytes());
    key.extend_from_slice(&chapter_num.to_be_bytes());
    key
}

/// Prefix for iterating all chapters of a book.
#[must_use]
pub fn book_chapters_prefix(book_id: &BookId) -> Vec<u8> {
    book_id.as_bytes().to_vec()
}

/// Extract the chapter ID from a book-chapter index key.
#[must_use]
pub fn chapter_id_from_book_key(key: &[u8]) -> Option<ChapterId> {
    tail_id(key, ID_LEN + 4).map(ChapterId::from_bytes)
}

/// Create a chapter purchase key.
///
/// Format: `user_id (16) || chapter_id (16)`
#[must_use]
pub fn chapter_purchase_key(user_id: &UserId, chapter_id: &ChapterId) -> Vec<u8> {
    pair(user_id.as_bytes(), chapter_id.as_bytes())
}

/// Create a user purchase-order index key.
///
/// Format: `user_id (16) || purchase_id (16)`
///
/// Since ULIDs are time-ordered, a user's purchases sort by commit time.
#[must_use]
pub fn user_purchase_key(user_id: &UserId, purchase_id: &PurchaseId) -> Vec<u8> {
    pair(user_id.as_bytes(), &purchase_id.to_bytes())
}

/// Create a per-book chapter purchase index key.
///
/// Format: `user_id (16) || book_id (16) || chapter_id (16)`
#[must_use]
pub fn user_book_chapter_key(user_id: &UserId, book_id: &BookId, chapter_id: &ChapterId) -> Vec<u8> {
    let mut key = user_book_prefix(user_id, book_id);
    key.extend_from_slice(chapter_id.as_bytes());
    key
}

/// Prefix for iterating a user's purchases within one book.
#[must_use]
pub fn user_book_prefix(user_id: &UserId, book_id: &BookId) -> Vec<u8> {
    pair(user_id.as_bytes(), book_id.as_bytes())
}

/// Extract the chapter ID from a per-book chapter purchase index key.
#[must_use]
pub fn chapter_id_from_user_book_key(key: &[u8]) -> Option<ChapterId> {
    tail_id(key, 2 * ID_LEN).map(ChapterId::from_bytes)
}

/// Create a batch receipt key.
///
/// Format: `user_id (16) || batch_id (16)`
#[must_use]
pub fn batch_key(user_id: &UserId, batch_id: &PurchaseId) -> Vec<u8> {
    pair(user_id.as_bytes(), &batch_id.to_bytes())
}

/// Create a book purchase key.
///
/// Format: `user_id (16) || book_id (16)`
#[must_use]
pub fn book_purchase_key(user_id: &UserId, book_id: &BookId) -> Vec<u8> {
    pair(user_id.as_bytes(), book_id.as_bytes())
}

/// Prefix for iterating any per-user column family.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

fn pair(first: &[u8], second: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(first.len() + second.len());
    key.extend_from_slice(first);
    key.extend_from_slice(second);
    key
}

fn tail_id(key: &[u8], start: usize) -> Option<[u8; 16]> {
    key.get(start..start + ID_LEN)?.try_into().ok()
}

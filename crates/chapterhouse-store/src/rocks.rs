//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use chapterhouse_core::{
    Book, BookId, BookPurchase, Chapter, ChapterId, ChapterPurchase, ChapterPurchaseBatch,
    OwnershipKey, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::txn::{CommitSummary, InFlight, LedgerTxn, LedgerWrite};
use crate::{page, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    in_flight: InFlight,
    catalog_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            in_flight: InFlight::default(),
            catalog_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn key_exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self
            .db
            .get_pinned_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    /// Collect every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Decode every value under `prefix`, in key order.
    fn scan_values<T: serde::de::DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan_prefix(cf_name, prefix)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect()
    }

    fn ownership_exists(&self, key: &OwnershipKey) -> Result<bool> {
        match key {
            OwnershipKey::Chapter {
                user_id,
                chapter_id,
            } => self.key_exists(
                cf::CHAPTER_PURCHASES,
                &keys::chapter_purchase_key(user_id, chapter_id),
            ),
            OwnershipKey::Book { user_id, book_id } => self.key_exists(
                cf::BOOK_PURCHASES,
                &keys::book_purchase_key(user_id, book_id),
            ),
        }
    }

    fn stage(&self, batch: &mut WriteBatch, write: &LedgerWrite) -> Result<()> {
        match write {
            LedgerWrite::ChapterPurchase(row) | LedgerWrite::Grant(row) => {
                let cf_rows = self.cf(cf::CHAPTER_PURCHASES)?;
                let cf_by_user = self.cf(cf::CHAPTER_PURCHASES_BY_USER)?;
                let cf_by_book = self.cf(cf::CHAPTER_PURCHASES_BY_BOOK)?;

                batch.put_cf(
                    &cf_rows,
                    keys::chapter_purchase_key(&row.user_id, &row.chapter_id),
                    Self::serialize(row)?,
                );
                batch.put_cf(
                    &cf_by_user,
                    keys::user_purchase_key(&row.user_id, &row.id),
                    row.chapter_id.as_bytes(),
                );
                batch.put_cf(
                    &cf_by_book,
                    keys::user_book_chapter_key(&row.user_id, &row.book_id, &row.chapter_id),
                    [],
                );
            }
            LedgerWrite::Batch(receipt) => {
                let cf_batches = self.cf(cf::PURCHASE_BATCHES)?;
                batch.put_cf(
                    &cf_batches,
                    keys::batch_key(&receipt.user_id, &receipt.id),
                    Self::serialize(receipt)?,
                );
            }
            LedgerWrite::BookPurchase(purchase) => {
                let cf_books = self.cf(cf::BOOK_PURCHASES)?;
                batch.put_cf(
                    &cf_books,
                    keys::book_purchase_key(&purchase.user_id, &purchase.book_id),
                    Self::serialize(purchase)?,
                );
            }
        }
        Ok(())
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    fn put_book(&self, book: &Book) -> Result<()> {
        let cf = self.cf(cf::BOOKS)?;
        let value = Self::serialize(book)?;

        self.db
            .put_cf(&cf, keys::book_key(&book.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        self.get_value(cf::BOOKS, &keys::book_key(book_id))
    }

    fn put_chapter(&self, chapter: &Chapter) -> Result<()> {
        chapter
            .validate()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let _guard = self.catalog_lock.lock().map_err(|_| StoreError::poisoned())?;

        // Sequence numbers are unique per book.
        let num_prefix = keys::book_chapter_num_prefix(&chapter.book_id, chapter.chapter_num);
        let taken = self
            .scan_prefix(cf::CHAPTERS_BY_BOOK, &num_prefix)?
            .iter()
            .filter_map(|(key, _)| keys::chapter_id_from_book_key(key))
            .any(|id| id != chapter.id);
        if taken {
            return Err(StoreError::InvalidRecord(format!(
                "chapter number {} already used in book {}",
                chapter.chapter_num, chapter.book_id
            )));
        }

        let cf_chapters = self.cf(cf::CHAPTERS)?;
        let cf_by_book = self.cf(cf::CHAPTERS_BY_BOOK)?;
        let mut batch = WriteBatch::default();

        if let Some(previous) = self.get_chapter(&chapter.id)? {
            batch.delete_cf(
                &cf_by_book,
                keys::book_chapter_key(&previous.book_id, previous.chapter_num, &previous.id),
            );
        }

        batch.put_cf(&cf_chapters, keys::chapter_key(&chapter.id), Self::serialize(chapter)?);
        batch.put_cf(
            &cf_by_book,
            keys::book_chapter_key(&chapter.book_id, chapter.chapter_num, &chapter.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_chapter(&self, chapter_id: &ChapterId) -> Result<Option<Chapter>> {
        self.get_value(cf::CHAPTERS, &keys::chapter_key(chapter_id))
    }

    fn list_chapters(&self, book_id: &BookId) -> Result<Vec<Chapter>> {
        let prefix = keys::book_chapters_prefix(book_id);
        let mut chapters = Vec::new();

        for (key, _) in self.scan_prefix(cf::CHAPTERS_BY_BOOK, &prefix)? {
            let Some(chapter_id) = keys::chapter_id_from_book_key(&key) else {
                continue;
            };
            if let Some(chapter) = self.get_chapter(&chapter_id)? {
                chapters.push(chapter);
            }
        }

        Ok(chapters)
    }

    // =========================================================================
    // Ledger Reads
    // =========================================================================

    fn get_chapter_purchase(
        &self,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> Result<Option<ChapterPurchase>> {
        self.get_value(
            cf::CHAPTER_PURCHASES,
            &keys::chapter_purchase_key(user_id, chapter_id),
        )
    }

    fn has_chapter_purchase(&self, user_id: &UserId, chapter_id: &ChapterId) -> Result<bool> {
        self.key_exists(
            cf::CHAPTER_PURCHASES,
            &keys::chapter_purchase_key(user_id, chapter_id),
        )
    }

    fn get_book_purchase(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Option<BookPurchase>> {
        self.get_value(cf::BOOK_PURCHASES, &keys::book_purchase_key(user_id, book_id))
    }

    fn has_book_purchase(&self, user_id: &UserId, book_id: &BookId) -> Result<bool> {
        self.key_exists(cf::BOOK_PURCHASES, &keys::book_purchase_key(user_id, book_id))
    }

    fn purchased_chapter_ids(&self, user_id: &UserId, book_id: &BookId) -> Result<Vec<ChapterId>> {
        let prefix = keys::user_book_prefix(user_id, book_id);
        Ok(self
            .scan_prefix(cf::CHAPTER_PURCHASES_BY_BOOK, &prefix)?
            .iter()
            .filter_map(|(key, _)| keys::chapter_id_from_user_book_key(key))
            .collect())
    }

    fn list_chapter_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchase>> {
        let prefix = keys::user_prefix(user_id);

        // ULID keys are time-ordered; walk them backwards for newest first.
        let index = self.scan_prefix(cf::CHAPTER_PURCHASES_BY_USER, &prefix)?;
        let chapter_ids = index.iter().rev().filter_map(|(_, value)| {
            <[u8; 16]>::try_from(value.as_ref())
                .ok()
                .map(ChapterId::from_bytes)
        });

        let mut rows = Vec::new();
        for chapter_id in page(chapter_ids, limit, offset) {
            if let Some(row) = self.get_chapter_purchase(user_id, &chapter_id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn list_book_chapter_purchases(
        &self,
        user_id: &UserId,
        book_id: &BookId,
    ) -> Result<Vec<ChapterPurchase>> {
        let mut rows = Vec::new();
        for chapter_id in self.purchased_chapter_ids(user_id, book_id)? {
            if let Some(row) = self.get_chapter_purchase(user_id, &chapter_id)? {
                rows.push(row);
            }
        }
        rows.sort_by_key(|row| row.chapter_num);
        Ok(rows)
    }

    fn list_batches(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChapterPurchaseBatch>> {
        let batches: Vec<ChapterPurchaseBatch> =
            self.scan_values(cf::PURCHASE_BATCHES, &keys::user_prefix(user_id))?;
        Ok(page(batches.into_iter().rev(), limit, offset))
    }

    fn list_book_purchases(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BookPurchase>> {
        // Keyed by book, not time; order by commit time here.
        let mut purchases: Vec<BookPurchase> =
            self.scan_values(cf::BOOK_PURCHASES, &keys::user_prefix(user_id))?;
        purchases.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(page(purchases.into_iter(), limit, offset))
    }

    fn total_spent_cents(&self, user_id: &UserId) -> Result<i64> {
        let prefix = keys::user_prefix(user_id);
        let rows: Vec<ChapterPurchase> = self.scan_values(cf::CHAPTER_PURCHASES, &prefix)?;
        let books: Vec<BookPurchase> = self.scan_values(cf::BOOK_PURCHASES, &prefix)?;

        Ok(rows.iter().map(|row| row.price_cents).sum::<i64>()
            + books.iter().map(|book| book.total_price_cents).sum::<i64>())
    }

    // =========================================================================
    // Ledger Writes
    // =========================================================================

    fn reserve(&self, keys: &[OwnershipKey]) -> Result<()> {
        self.in_flight
            .reserve(keys, |key| self.ownership_exists(key))
    }

    fn release(&self, keys: &[OwnershipKey]) -> Result<()> {
        self.in_flight.release(keys)
    }

    fn commit(&self, txn: LedgerTxn) -> Result<CommitSummary> {
        let _commit_lock = self.in_flight.lock()?;

        let (writes, summary) = txn
            .resolve(|key| self.ownership_exists(key))?
            .into_parts();

        let mut batch = WriteBatch::default();
        for write in &writes {
            self.stage(&mut batch, write)?;
        }

        // Write atomically
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction;
    use chapterhouse_core::PurchaseId;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn seed(store: &RocksStore) -> (Book, Vec<Chapter>) {
        let book = Book::new("Dune", "Frank Herbert").with_cover("https://cdn/dune.png");
        let chapters = vec![
            Chapter::free(book.id, 1, "Prologue").with_word_count(1_200),
            Chapter::paid(book.id, 2, "Arrakis", 199),
            Chapter::paid(book.id, 3, "Spice", 299),
            Chapter::paid(book.id, 10, "Muad'Dib", 399),
        ];
        store.put_book(&book).unwrap();
        for chapter in chapters.iter().rev() {
            store.put_chapter(chapter).unwrap();
        }
        (book, chapters)
    }

    #[test]
    fn catalog_round_trip() {
        let (store, _dir) = create_test_store();
        let (book, chapters) = seed(&store);

        let retrieved = store.get_book(&book.id).unwrap().unwrap();
        assert_eq!(retrieved.cover_url.as_deref(), Some("https://cdn/dune.png"));

        let listed = store.list_chapters(&book.id).unwrap();
        let nums: Vec<_> = listed.iter().map(|c| c.chapter_num).collect();
        assert_eq!(nums, vec![1, 2, 3, 10]);
        assert_eq!(listed[0].word_count, 1_200);

        assert_eq!(store.list_paid_chapters(&book.id).unwrap().len(), 3);
        assert_eq!(
            store.get_chapter(&chapters[1].id).unwrap().unwrap().title,
            "Arrakis"
        );
    }

    #[test]
    fn renumbered_chapter_moves_in_index() {
        let (store, _dir) = create_test_store();
        let (book, chapters) = seed(&store);

        let mut moved = chapters[1].clone();
        moved.chapter_num = 20;
        store.put_chapter(&moved).unwrap();

        let nums: Vec<_> = store
            .list_chapters(&book.id)
            .unwrap()
            .iter()
            .map(|c| c.chapter_num)
            .collect();
        assert_eq!(nums, vec![1, 3, 10, 20]);
    }

    #[test]
    fn taken_sequence_number_is_rejected() {
        let (store, _dir) = create_test_store();
        let (book, _) = seed(&store);

        let result = store.put_chapter(&Chapter::paid(book.id, 3, "Duplicate", 100));
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
    }

    #[test]
    fn chapter_purchase_indexes() {
        let (store, _dir) = create_test_store();
        let (book, chapters) = seed(&store);
        let user_id = UserId::generate();

        for chapter in &chapters[1..3] {
            transaction(&store, |txn| {
                txn.insert_chapter_purchase(ChapterPurchase::paid(user_id, chapter, &book));
                Ok(())
            })
            .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        assert!(store.has_chapter_purchase(&user_id, &chapters[1].id).unwrap());
        assert!(!store.has_chapter_purchase(&user_id, &chapters[3].id).unwrap());

        let newest = store.list_chapter_purchases(&user_id, 10, 0).unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].chapter_id, chapters[2].id);

        let mut ids = store.purchased_chapter_ids(&user_id, &book.id).unwrap();
        ids.sort();
        let mut expected = vec![chapters[1].id, chapters[2].id];
        expected.sort();
        assert_eq!(ids, expected);

        let in_book = store.list_book_chapter_purchases(&user_id, &book.id).unwrap();
        assert_eq!(in_book[0].chapter_num, 2);
        assert_eq!(store.total_spent_cents(&user_id).unwrap(), 498);
    }

    #[test]
    fn book_purchase_grants_only_missing_rows() {
        let (store, _dir) = create_test_store();
        let (book, chapters) = seed(&store);
        let user_id = UserId::generate();

        transaction(&store, |txn| {
            txn.insert_chapter_purchase(ChapterPurchase::paid(user_id, &chapters[1], &book));
            Ok(())
        })
        .unwrap();

        let purchase = BookPurchase {
            id: PurchaseId::generate(),
            user_id,
            book_id: book.id,
            total_price_cents: 717,
            original_price_cents: 897,
            discount_bps: 2_000,
            chapter_count: 3,
            purchased_at: chrono::Utc::now(),
            book_title: book.title.clone(),
            book_cover_url: book.cover_url.clone(),
            receipt_id: Some("rcpt_1".into()),
        };

        transaction(&store, |txn| {
            txn.insert_book_purchase(purchase.clone());
            for chapter in &chapters[1..] {
                txn.grant_chapter(ChapterPurchase::granted(user_id, chapter, &book));
            }
            Ok(())
        })
        .unwrap();

        assert!(store.has_book_purchase(&user_id, &book.id).unwrap());
        // The original paid row survives.
        let row = store
            .get_chapter_purchase(&user_id, &chapters[1].id)
            .unwrap()
            .unwrap();
        assert_eq!(row.price_cents, 199);
        assert_eq!(store.list_book_chapter_purchases(&user_id, &book.id).unwrap().len(), 3);
        assert_eq!(store.total_spent_cents(&user_id).unwrap(), 199 + 717);

        let second = transaction(&store, |txn| {
            txn.insert_book_purchase(BookPurchase {
                id: PurchaseId::generate(),
                ..purchase.clone()
            });
            Ok(())
        });
        assert!(matches!(second, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn batches_list_newest_first() {
        let (store, _dir) = create_test_store();
        let (book, chapters) = seed(&store);
        let user_id = UserId::generate();

        for chapter in &chapters[1..3] {
            let receipt = ChapterPurchaseBatch {
                id: PurchaseId::generate(),
                user_id,
                book_id: book.id,
                chapter_ids: vec![chapter.id],
                total_price_cents: chapter.price_cents,
                chapters_count: 1,
                purchased_at: chrono::Utc::now(),
                book_title: book.title.clone(),
                book_cover_url: None,
                receipt_id: None,
            };
            transaction(&store, |txn| {
                txn.insert_batch(receipt);
                txn.insert_chapter_purchase(ChapterPurchase::paid(user_id, chapter, &book));
                Ok(())
            })
            .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let batches = store.list_batches(&user_id, 10, 0).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].chapter_ids, vec![chapters[2].id]);
        assert_eq!(store.list_batches(&user_id, 1, 1).unwrap().len(), 1);
    }

    #[test]
    fn reservations_block_concurrent_claims() {
        let (store, _dir) = create_test_store();
        let (book, _) = seed(&store);
        let key = OwnershipKey::Book {
            user_id: UserId::generate(),
            book_id: book.id,
        };

        store.reserve(&[key]).unwrap();
        assert!(matches!(
            store.reserve(&[key]),
            Err(StoreError::Conflict { .. })
        ));
        store.release(&[key]).unwrap();
        store.reserve(&[key]).unwrap();
    }

    #[test]
    fn reopened_store_keeps_ledger() {
        let dir = TempDir::new().unwrap();
        let user_id = UserId::generate();
        let chapter_id = {
            let store = RocksStore::open(dir.path()).unwrap();
            let (book, chapters) = seed(&store);
            transaction(&store, |txn| {
                txn.insert_chapter_purchase(ChapterPurchase::paid(user_id, &chapters[2], &book));
                Ok(())
            })
            .unwrap();
            chapters[2].id
        };

        let store = RocksStore::open(dir.path()).unwrap();
        assert!(store.has_chapter_purchase(&user_id, &chapter_id).unwrap());
    }
}

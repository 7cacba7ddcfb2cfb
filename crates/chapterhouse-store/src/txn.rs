//! Staged ledger writes and in-flight reservations.
//!
//! A [`LedgerTxn`] collects the rows of one purchase. Nothing is visible until
//! the store commits the whole set, and a commit either writes every staged
//! row or none of them.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chapterhouse_core::{BookPurchase, ChapterPurchase, ChapterPurchaseBatch, OwnershipKey};

use crate::error::{Result, StoreError};

/// One staged ledger write.
#[derive(Debug, Clone)]
pub enum LedgerWrite {
    /// A chapter row that must not already exist.
    ChapterPurchase(ChapterPurchase),

    /// A chapter row that is dropped if the user already owns the chapter.
    Grant(ChapterPurchase),

    /// A batch receipt.
    Batch(ChapterPurchaseBatch),

    /// A whole-book purchase that must not already exist.
    BookPurchase(BookPurchase),
}

impl LedgerWrite {
    /// The uniqueness key this write claims, if any.
    #[must_use]
    pub const fn ownership_key(&self) -> Option<OwnershipKey> {
        match self {
            Self::ChapterPurchase(row) | Self::Grant(row) => Some(row.ownership_key()),
            Self::BookPurchase(purchase) => Some(purchase.ownership_key()),
            Self::Batch(_) => None,
        }
    }
}

/// A set of ledger writes committed atomically.
#[derive(Debug, Default)]
pub struct LedgerTxn {
    writes: Vec<LedgerWrite>,
}

impl LedgerTxn {
    /// Create an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a chapter purchase. The commit fails with a conflict if the user
    /// already owns the chapter.
    pub fn insert_chapter_purchase(&mut self, purchase: ChapterPurchase) {
        self.writes.push(LedgerWrite::ChapterPurchase(purchase));
    }

    /// Stage a granted chapter row, skipped at commit if the chapter is owned.
    pub fn grant_chapter(&mut self, purchase: ChapterPurchase) {
        self.writes.push(LedgerWrite::Grant(purchase));
    }

    /// Stage a batch receipt.
    pub fn insert_batch(&mut self, batch: ChapterPurchaseBatch) {
        self.writes.push(LedgerWrite::Batch(batch));
    }

    /// Stage a whole-book purchase. The commit fails with a conflict if the
    /// user already owns the book.
    pub fn insert_book_purchase(&mut self, purchase: BookPurchase) {
        self.writes.push(LedgerWrite::BookPurchase(purchase));
    }

    /// Staged writes, in staging order.
    #[must_use]
    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    /// Number of staged writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Check the staged writes against the ledger and drop redundant grants.
    ///
    /// `exists` reports whether a key is already committed. The caller must
    /// hold the commit lock for the duration of the check and the write.
    pub(crate) fn resolve(
        self,
        exists: impl Fn(&OwnershipKey) -> Result<bool>,
    ) -> Result<ResolvedTxn> {
        let mut claimed = HashSet::new();
        let mut writes = Vec::with_capacity(self.writes.len());
        let mut skipped_grants = 0;

        for write in self.writes {
            let Some(key) = write.ownership_key() else {
                writes.push(write);
                continue;
            };

            let is_grant = matches!(write, LedgerWrite::Grant(_));
            let taken = claimed.contains(&key) || exists(&key)?;
            match (is_grant, taken) {
                (true, true) => skipped_grants += 1,
                (false, true) => return Err(StoreError::Conflict { key }),
                (_, false) => {
                    claimed.insert(key);
                    writes.push(write);
                }
            }
        }

        Ok(ResolvedTxn {
            writes,
            summary: CommitSummary {
                written: 0,
                skipped_grants,
            },
        })
    }
}

/// Writes that passed the uniqueness check and are ready to apply.
pub(crate) struct ResolvedTxn {
    pub(crate) writes: Vec<LedgerWrite>,
    pub(crate) summary: CommitSummary,
}

impl ResolvedTxn {
    pub(crate) fn into_parts(mut self) -> (Vec<LedgerWrite>, CommitSummary) {
        self.summary.written = self.writes.len();
        (self.writes, self.summary)
    }
}

/// What a commit actually wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Records written.
    pub written: usize,

    /// Grant rows dropped because the chapter was already owned.
    pub skipped_grants: usize,
}

/// Ledger keys claimed by purchases that have not committed yet.
///
/// The same mutex serializes commits, so a reservation check and a commit
/// never interleave. Backends take this lock before their own state lock.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    keys: Mutex<HashSet<OwnershipKey>>,
}

impl InFlight {
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, HashSet<OwnershipKey>>> {
        self.keys.lock().map_err(|_| StoreError::poisoned())
    }

    /// Claim every key or none. `exists` reports committed keys.
    pub(crate) fn reserve(
        &self,
        keys: &[OwnershipKey],
        exists: impl Fn(&OwnershipKey) -> Result<bool>,
    ) -> Result<()> {
        let mut in_flight = self.lock()?;
        let mut requested = HashSet::with_capacity(keys.len());

        for key in keys {
            if in_flight.contains(key) || !requested.insert(*key) || exists(key)? {
                return Err(StoreError::Conflict { key: *key });
            }
        }

        in_flight.extend(requested);
        Ok(())
    }

    pub(crate) fn release(&self, keys: &[OwnershipKey]) -> Result<()> {
        let mut in_flight = self.lock()?;
        for key in keys {
            in_flight.remove(key);
        }
        Ok(())
    }
}

//! Purchase orchestration.
//!
//! Every purchase runs in two phases:
//!
//! 1. **Prepare**, under the purchase deadline: validate, claim the ledger
//!    keys with a [`Reservation`], check the balance. Nothing is charged yet,
//!    so dropping this phase at any point leaves no trace.
//! 2. **Settle**, in a spawned task the caller cannot cancel: consume from
//!    the wallet, commit the ledger rows, invalidate caches. A charge that
//!    cannot be recorded is refunded before the error is returned.

use std::collections::HashSet;
use std::sync::Arc;

use chapterhouse_core::pricing;
use chapterhouse_core::{
    AccessDecision, BookId, BookPurchase, ChapterId, ChapterPurchase, ChapterPurchaseBatch,
    CommerceError, OwnershipKey, PurchaseId, Result, SkippedChapter, UserId, Viewer,
};
use chapterhouse_store::{LedgerTxn, Store};
use chapterhouse_wallet::WalletReceipt;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::Invalidation;
use crate::CommerceService;

/// Result of a multi-chapter purchase.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReceipt {
    /// The batch record.
    pub batch: ChapterPurchaseBatch,

    /// One row per charged chapter.
    pub purchases: Vec<ChapterPurchase>,

    /// Requested chapters that were not charged.
    pub skipped: Vec<SkippedChapter>,
}

/// Ledger records a purchase writes once the wallet has been charged.
trait LedgerOrder: Send + 'static {
    /// Stamp the wallet receipt and commit time.
    fn finalize(&mut self, receipt_id: Option<&str>, committed_at: DateTime<Utc>);

    /// Stage the records on `txn`.
    fn stage(&self, txn: &mut LedgerTxn);
}

impl LedgerOrder for ChapterPurchase {
    fn finalize(&mut self, receipt_id: Option<&str>, committed_at: DateTime<Utc>) {
        self.receipt_id = receipt_id.map(str::to_string);
        self.purchased_at = committed_at;
    }

    fn stage(&self, txn: &mut LedgerTxn) {
        txn.insert_chapter_purchase(self.clone());
    }
}

impl LedgerOrder for BatchReceipt {
    fn finalize(&mut self, receipt_id: Option<&str>, committed_at: DateTime<Utc>) {
        self.batch.receipt_id = receipt_id.map(str::to_string);
        self.batch.purchased_at = committed_at;
        for purchase in &mut self.purchases {
            purchase.finalize(receipt_id, committed_at);
        }
    }

    fn stage(&self, txn: &mut LedgerTxn) {
        txn.insert_batch(self.batch.clone());
        for purchase in &self.purchases {
            txn.insert_chapter_purchase(purchase.clone());
        }
    }
}

struct BookOrder {
    purchase: BookPurchase,
    grants: Vec<ChapterPurchase>,
}

impl LedgerOrder for BookOrder {
    fn finalize(&mut self, receipt_id: Option<&str>, committed_at: DateTime<Utc>) {
        self.purchase.receipt_id = receipt_id.map(str::to_string);
        self.purchase.purchased_at = committed_at;
        for grant in &mut self.grants {
            grant.finalize(receipt_id, committed_at);
        }
    }

    fn stage(&self, txn: &mut LedgerTxn) {
        txn.insert_book_purchase(self.purchase.clone());
        for grant in &self.grants {
            txn.grant_chapter(grant.clone());
        }
    }
}

/// A prepared purchase waiting to be charged and recorded.
struct Settlement<T> {
    user_id: UserId,
    amount_cents: i64,
    memo: String,
    order: T,
    invalidation: Invalidation,
}

/// Ledger keys claimed for an in-flight purchase, released on drop.
struct Reservation {
    store: Arc<dyn Store>,
    keys: Vec<OwnershipKey>,
}

impl Reservation {
    fn acquire(store: &Arc<dyn Store>, keys: Vec<OwnershipKey>) -> Result<Self> {
        store.reserve(&keys)?;
        Ok(Self {
            store: Arc::clone(store),
            keys,
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Err(e) = self.store.release(&self.keys) {
            tracing::warn!(keys = self.keys.len(), error = %e, "Failed to release purchase reservation");
        }
    }
}

impl CommerceService {
    /// Buy one chapter.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the chapter or its book does not exist
    /// - `InvalidOperation` if the chapter is free
    /// - `AlreadyOwned` if the user can already read it, or another purchase
    ///   of it is in flight
    /// - `InsufficientFunds` if the balance cannot cover the price
    /// - `Timeout`, `Wallet` or `TransientStore` if settlement fails; the user
    ///   is not left charged without a purchase row
    pub async fn purchase_chapter(
        &self,
        user_id: UserId,
        chapter_id: &ChapterId,
    ) -> Result<ChapterPurchase> {
        let deadline = Instant::now() + self.purchase_timeout();
        let (settlement, reservation) = self
            .within_deadline(deadline, self.prepare_chapter(user_id, chapter_id))
            .await?;
        self.settle(settlement, reservation, deadline).await
    }

    /// Buy several chapters of one book with a single charge.
    ///
    /// Free and already-owned chapters are skipped and reported in
    /// [`BatchReceipt::skipped`]. Duplicate ids count once.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if no ids are given, the chapters span several
    ///   books, or nothing is left to charge
    /// - `NotFound` if any chapter does not exist
    /// - `AlreadyOwned` if another purchase of one of the chapters is in flight
    /// - otherwise as [`CommerceService::purchase_chapter`]
    pub async fn purchase_chapters(
        &self,
        user_id: UserId,
        chapter_ids: &[ChapterId],
    ) -> Result<BatchReceipt> {
        let deadline = Instant::now() + self.purchase_timeout();
        let (settlement, reservation) = self
            .within_deadline(deadline, self.prepare_batch(user_id, chapter_ids))
            .await?;
        self.settle(settlement, reservation, deadline).await
    }

    /// Buy a whole book at the discounted price.
    ///
    /// Grants a zero-price row for every paid chapter the user does not
    /// already own.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the book does not exist
    /// - `AlreadyOwned` if the user already bought the book
    /// - `InvalidOperation` if the book has no paid chapters
    /// - otherwise as [`CommerceService::purchase_chapter`]
    pub async fn purchase_book(&self, user_id: UserId, book_id: &BookId) -> Result<BookPurchase> {
        let deadline = Instant::now() + self.purchase_timeout();
        let (settlement, reservation) = self
            .within_deadline(deadline, self.prepare_book(user_id, book_id))
            .await?;
        let order = self.settle(settlement, reservation, deadline).await?;
        Ok(order.purchase)
    }

    async fn within_deadline<T>(
        &self,
        deadline: Instant,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| self.timeout_error())?
    }

    fn timeout_error(&self) -> CommerceError {
        CommerceError::Timeout {
            timeout_ms: self.config.purchase_timeout_ms,
        }
    }

    async fn ensure_balance(&self, user_id: &UserId, required: i64) -> Result<()> {
        if required == 0 {
            return Ok(());
        }

        let balance = self.wallet.get_balance(user_id).await?;
        if balance < required {
            tracing::info!(user_id = %user_id, balance, required, "Insufficient balance for purchase");
            return Err(CommerceError::InsufficientFunds { balance, required });
        }
        Ok(())
    }

    // =========================================================================
    // Prepare
    // =========================================================================

    async fn prepare_chapter(
        &self,
        user_id: UserId,
        chapter_id: &ChapterId,
    ) -> Result<(Settlement<ChapterPurchase>, Reservation)> {
        let chapter = self.require_chapter(chapter_id)?;

        match self.decide(Viewer::Authenticated(user_id), &chapter)? {
            AccessDecision::Free => {
                return Err(CommerceError::InvalidOperation(format!(
                    "chapter {chapter_id} is free"
                )));
            }
            AccessDecision::Purchased { .. } | AccessDecision::BookOwned => {
                return Err(CommerceError::AlreadyOwned {
                    entity: "chapter",
                    id: chapter_id.to_string(),
                });
            }
            AccessDecision::Denied => {}
        }

        let book = self.require_book(&chapter.book_id)?;
        let purchase = ChapterPurchase::paid(user_id, &chapter, &book);
        let reservation = Reservation::acquire(&self.store, vec![purchase.ownership_key()])?;
        self.ensure_balance(&user_id, purchase.price_cents).await?;

        let settlement = Settlement {
            user_id,
            amount_cents: purchase.price_cents,
            memo: format!(
                "Chapter {}: {} ({})",
                chapter.chapter_num, chapter.title, book.title
            ),
            invalidation: Invalidation::Chapter {
                chapter_id: chapter.id,
                book_id: chapter.book_id,
            },
            order: purchase,
        };
        Ok((settlement, reservation))
    }

    async fn prepare_batch(
        &self,
        user_id: UserId,
        chapter_ids: &[ChapterId],
    ) -> Result<(Settlement<BatchReceipt>, Reservation)> {
        let mut seen = HashSet::with_capacity(chapter_ids.len());
        let chapters = chapter_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .map(|id| self.require_chapter(id))
            .collect::<Result<Vec<_>>>()?;

        let Some(book_id) = chapters.first().map(|chapter| chapter.book_id) else {
            return Err(CommerceError::InvalidOperation(
                "no chapters requested".into(),
            ));
        };
        if chapters.iter().any(|chapter| chapter.book_id != book_id) {
            return Err(CommerceError::InvalidOperation(
                "all chapters of a batch must belong to one book".into(),
            ));
        }

        let book = self.require_book(&book_id)?;
        let owned: HashSet<ChapterId> = if self.store.has_book_purchase(&user_id, &book_id)? {
            chapters.iter().map(|chapter| chapter.id).collect()
        } else {
            self.store
                .purchased_chapter_ids(&user_id, &book_id)?
                .into_iter()
                .collect()
        };

        let quote = pricing::quote_batch(&chapters, &owned);
        for skipped in &quote.skipped {
            tracing::debug!(
                user_id = %user_id,
                chapter_id = %skipped.chapter_id,
                reason = ?skipped.reason,
                "Skipping chapter in batch purchase"
            );
        }
        if quote.is_empty() {
            return Err(CommerceError::InvalidOperation(
                "nothing to purchase: every requested chapter is free or already owned".into(),
            ));
        }

        let purchases: Vec<ChapterPurchase> = quote
            .eligible
            .iter()
            .map(|chapter| ChapterPurchase::paid(user_id, chapter, &book))
            .collect();
        let batch = ChapterPurchaseBatch {
            id: PurchaseId::generate(),
            user_id,
            book_id,
            chapter_ids: purchases.iter().map(|p| p.chapter_id).collect(),
            total_price_cents: quote.total_price_cents,
            chapters_count: purchases.len(),
            purchased_at: Utc::now(),
            book_title: book.title.clone(),
            book_cover_url: book.cover_url.clone(),
            receipt_id: None,
        };

        let keys = purchases.iter().map(ChapterPurchase::ownership_key).collect();
        let reservation = Reservation::acquire(&self.store, keys)?;
        self.ensure_balance(&user_id, quote.total_price_cents).await?;

        let settlement = Settlement {
            user_id,
            amount_cents: quote.total_price_cents,
            memo: format!("{} chapters of {}", batch.chapters_count, book.title),
            invalidation: Invalidation::Batch { book_id },
            order: BatchReceipt {
                batch,
                purchases,
                skipped: quote.skipped,
            },
        };
        Ok((settlement, reservation))
    }

    async fn prepare_book(
        &self,
        user_id: UserId,
        book_id: &BookId,
    ) -> Result<(Settlement<BookOrder>, Reservation)> {
        let book = self.require_book(book_id)?;
        if self.store.has_book_purchase(&user_id, book_id)? {
            return Err(CommerceError::AlreadyOwned {
                entity: "book",
                id: book_id.to_string(),
            });
        }

        let paid = self.store.list_paid_chapters(book_id)?;
        let quote = pricing::quote_book(&paid);
        if quote.paid_chapters == 0 {
            return Err(CommerceError::InvalidOperation(format!(
                "book {book_id} has no paid chapters"
            )));
        }

        let purchase = BookPurchase {
            id: PurchaseId::generate(),
            user_id,
            book_id: book.id,
            total_price_cents: quote.discounted_price_cents,
            original_price_cents: quote.original_price_cents,
            discount_bps: quote.discount_bps,
            chapter_count: quote.paid_chapters,
            purchased_at: Utc::now(),
            book_title: book.title.clone(),
            book_cover_url: book.cover_url.clone(),
            receipt_id: None,
        };
        let grants = paid
            .iter()
            .map(|chapter| ChapterPurchase::granted(user_id, chapter, &book))
            .collect();

        let reservation = Reservation::acquire(&self.store, vec![purchase.ownership_key()])?;
        self.ensure_balance(&user_id, quote.discounted_price_cents)
            .await?;

        let settlement = Settlement {
            user_id,
            amount_cents: quote.discounted_price_cents,
            memo: format!("Book: {}", book.title),
            invalidation: Invalidation::Book { book_id: book.id },
            order: BookOrder { purchase, grants },
        };
        Ok((settlement, reservation))
    }

    // =========================================================================
    // Settle
    // =========================================================================

    async fn settle<T: LedgerOrder>(
        &self,
        settlement: Settlement<T>,
        reservation: Reservation,
        deadline: Instant,
    ) -> Result<T> {
        let service = self.clone();
        let task = tokio::spawn(async move {
            let result = service.run_settlement(settlement, deadline).await;
            drop(reservation);
            result
        });

        task.await.map_err(|e| {
            tracing::error!(error = %e, "Purchase settlement task failed");
            CommerceError::TransientStore(format!("settlement task failed: {e}"))
        })?
    }

    async fn run_settlement<T: LedgerOrder>(
        &self,
        settlement: Settlement<T>,
        deadline: Instant,
    ) -> Result<T> {
        let Settlement {
            user_id,
            amount_cents,
            memo,
            mut order,
            invalidation,
        } = settlement;

        let receipt = if amount_cents > 0 {
            Some(self.wallet.consume(&user_id, amount_cents, &memo).await?)
        } else {
            None
        };

        if Instant::now() >= deadline {
            tracing::warn!(user_id = %user_id, amount_cents, "Purchase deadline passed after charge");
            self.refund(&user_id, amount_cents, &memo, receipt.as_ref())
                .await;
            return Err(self.timeout_error());
        }

        let receipt_id = receipt.as_ref().map(|r| r.receipt_id.as_str());
        order.finalize(receipt_id, Utc::now());

        let committed = chapterhouse_store::transaction(self.store.as_ref(), |txn| {
            order.stage(txn);
            Ok(())
        });
        if let Err(e) = committed {
            tracing::warn!(user_id = %user_id, amount_cents, error = %e, "Purchase commit failed");
            self.refund(&user_id, amount_cents, &memo, receipt.as_ref())
                .await;
            return Err(e.into());
        }

        tracing::info!(
            user_id = %user_id,
            amount_cents,
            receipt_id = ?receipt_id,
            memo = %memo,
            "Purchase committed"
        );

        self.cache.invalidate(&invalidation).await;
        Ok(order)
    }

    /// Return a charge that could not be recorded.
    async fn refund(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
        receipt: Option<&WalletReceipt>,
    ) {
        let Some(receipt) = receipt else {
            return;
        };

        let refund_memo = format!("Refund: {memo}");
        match self.wallet.refund(user_id, amount_cents, &refund_memo).await {
            Ok(refund) => tracing::info!(
                user_id = %user_id,
                amount_cents,
                charge_receipt_id = %receipt.receipt_id,
                refund_receipt_id = %refund.receipt_id,
                "Charge refunded"
            ),
            Err(e) => tracing::error!(
                user_id = %user_id,
                amount_cents,
                charge_receipt_id = %receipt.receipt_id,
                error = %e,
                "Refund failed; charge needs manual reconciliation"
            ),
        }
    }
}

//! Multi-chapter purchase integration tests.

mod common;

use chapterhouse_core::{ChapterId, CommerceError, SkipReason};
use chapterhouse_wallet::EntryKind;
use common::{TestHarness, STARTING_BALANCE};

#[tokio::test]
async fn batch_purchase_charges_once() {
    let harness = TestHarness::new().await;
    let ids: Vec<ChapterId> = harness.paid_chapters().iter().map(|c| c.id).collect();

    let receipt = harness
        .service
        .purchase_chapters(harness.user_id, &ids)
        .await
        .unwrap();

    assert_eq!(receipt.batch.chapters_count, 3);
    assert_eq!(receipt.batch.total_price_cents, 199 + 299 + 399);
    assert_eq!(receipt.batch.chapter_ids, ids);
    assert_eq!(receipt.purchases.len(), 3);
    assert!(receipt.skipped.is_empty());

    let entries = harness.wallet.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Consume);
    assert_eq!(entries[0].memo, "3 chapters of The Hobbit");
    assert_eq!(harness.balance().await, STARTING_BALANCE - 897);

    let receipt_id = Some(entries[0].receipt_id.clone());
    assert_eq!(receipt.batch.receipt_id, receipt_id);
    assert!(receipt.purchases.iter().all(|p| p.receipt_id == receipt_id));
}

#[tokio::test]
async fn batch_purchase_skips_free_and_owned() {
    let harness = TestHarness::new().await;
    let free = harness.free_chapter().id;
    let owned = harness.paid_chapters()[0].id;
    let wanted = harness.paid_chapters()[2].id;

    harness
        .service
        .purchase_chapter(harness.user_id, &owned)
        .await
        .unwrap();

    let receipt = harness
        .service
        .purchase_chapters(harness.user_id, &[free, owned, wanted])
        .await
        .unwrap();

    assert_eq!(receipt.batch.chapter_ids, vec![wanted]);
    assert_eq!(receipt.batch.total_price_cents, 399);
    assert_eq!(receipt.skipped.len(), 2);
    assert_eq!(receipt.skipped[0].chapter_id, free);
    assert_eq!(receipt.skipped[0].reason, SkipReason::Free);
    assert_eq!(receipt.skipped[1].chapter_id, owned);
    assert_eq!(receipt.skipped[1].reason, SkipReason::AlreadyOwned);
    assert_eq!(harness.balance().await, STARTING_BALANCE - 199 - 399);
}

#[tokio::test]
async fn batch_purchase_counts_duplicates_once() {
    let harness = TestHarness::new().await;
    let id = harness.paid_chapters()[1].id;

    let receipt = harness
        .service
        .purchase_chapters(harness.user_id, &[id, id, id])
        .await
        .unwrap();

    assert_eq!(receipt.batch.chapters_count, 1);
    assert_eq!(harness.balance().await, STARTING_BALANCE - 299);
}

#[tokio::test]
async fn batch_with_nothing_eligible_fails() {
    let harness = TestHarness::new().await;
    let owned = harness.paid_chapters()[0].id;
    harness
        .service
        .purchase_chapter(harness.user_id, &owned)
        .await
        .unwrap();

    let err = harness
        .service
        .purchase_chapters(harness.user_id, &[harness.free_chapter().id, owned])
        .await
        .unwrap_err();

    assert!(matches!(err, CommerceError::InvalidOperation(_)));
    assert_eq!(harness.wallet.entries().await.len(), 1);
}

#[tokio::test]
async fn empty_batch_fails() {
    let harness = TestHarness::new().await;

    let err = harness
        .service
        .purchase_chapters(harness.user_id, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, CommerceError::InvalidOperation(_)));
}

#[tokio::test]
async fn batch_across_books_fails() {
    let harness = TestHarness::new().await;
    let (_, other) = harness.seed_book("Dune", &[100]);

    let err = harness
        .service
        .purchase_chapters(
            harness.user_id,
            &[harness.paid_chapters()[0].id, other[0].id],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CommerceError::InvalidOperation(_)));
    assert!(harness.wallet.entries().await.is_empty());
}

#[tokio::test]
async fn batch_with_unknown_chapter_fails() {
    let harness = TestHarness::new().await;

    let err = harness
        .service
        .purchase_chapters(
            harness.user_id,
            &[harness.paid_chapters()[0].id, ChapterId::generate()],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CommerceError::NotFound { .. }));
    assert!(harness.wallet.entries().await.is_empty());
}

#[tokio::test]
async fn batch_with_insufficient_funds_writes_nothing() {
    let harness = TestHarness::builder().balance(500).build().await;
    let ids: Vec<ChapterId> = harness.paid_chapters().iter().map(|c| c.id).collect();

    let err = harness
        .service
        .purchase_chapters(harness.user_id, &ids)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CommerceError::InsufficientFunds {
            balance: 500,
            required: 897
        }
    ));
    let history = harness
        .service
        .purchase_history(&harness.user_id, None, 0)
        .unwrap();
    assert!(history.chapter_purchases.is_empty());
    assert!(history.batches.is_empty());
}

#[tokio::test]
async fn batch_invalidates_book_chapter_list() {
    let harness = TestHarness::new().await;
    let ids: Vec<ChapterId> = harness.paid_chapters().iter().map(|c| c.id).collect();

    harness
        .service
        .purchase_chapters(harness.user_id, &ids)
        .await
        .unwrap();

    let keys = harness.service.cache().keys();
    assert_eq!(
        harness.cache.invalidated_keys().await,
        vec![keys.book_chapters(&harness.book.id)]
    );
}

//! Core types for chapterhouse.
//!
//! This crate provides the foundational types of the chapter commerce subsystem:
//!
//! - **Identifiers**: `UserId`, `BookId`, `ChapterId`, `PurchaseId`
//! - **Catalog**: `Book`, `Chapter`, `ChapterCatalog`
//! - **Ledger**: `ChapterPurchase`, `ChapterPurchaseBatch`, `BookPurchase`
//! - **Pricing**: chapter, batch and whole-book prices
//! - **Access**: `Viewer`, `AccessDecision`, `ChapterAccess`
//!
//! # Money
//!
//! Every amount is an `i64` count of minor units (cents). Nothing inside the
//! crate converts to display units except [`pricing::to_display_units`] and
//! [`pricing::format_price`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod catalog;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod pricing;

pub use access::{AccessDecision, ChapterAccess, Viewer};
pub use catalog::{Book, CatalogEntry, Chapter, ChapterCatalog, ChapterInvariantError};
pub use error::{CommerceError, Result};
pub use ids::{BookId, ChapterId, IdError, PurchaseId, UserId};
pub use ledger::{
    BookPurchase, ChapterPurchase, ChapterPurchaseBatch, OwnershipKey, SkipReason, SkippedChapter,
};
pub use pricing::{BatchQuote, BookQuote, BOOK_PRICE_RATE_BPS};

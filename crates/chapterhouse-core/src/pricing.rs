//! Pricing calculator.
//!
//! Pure functions over chapter prices. All amounts are `i64` minor units
//! (cents); conversion to display units happens only in [`to_display_units`]
//! and [`format_price`].
//!
//! # Whole-book discount
//!
//! A whole book costs [`BOOK_PRICE_RATE_BPS`] / [`BPS_DENOMINATOR`] of the sum
//! of its paid chapter prices, rounded **down** to the minor unit:
//!
//! ```
//! use chapterhouse_core::pricing::apply_book_discount;
//!
//! // 8.97 * 0.8 = 7.176 -> 7.17
//! assert_eq!(apply_book_discount(897), 717);
//! ```

use std::collections::HashSet;

use serde::Serialize;

use crate::{Chapter, ChapterId, SkipReason, SkippedChapter};

/// Share of the original price charged for a whole book, in basis points (80%).
pub const BOOK_PRICE_RATE_BPS: u32 = 8_000;

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Minor units per display unit.
pub const MINOR_UNITS_PER_UNIT: i64 = 100;

/// Price of a single chapter in minor units. Free chapters cost nothing.
#[must_use]
pub const fn chapter_price(chapter: &Chapter) -> i64 {
    if chapter.is_free {
        0
    } else {
        chapter.price_cents
    }
}

/// Apply the whole-book discount, flooring to the minor unit.
#[must_use]
pub fn apply_book_discount(original_price_cents: i64) -> i64 {
    let discounted = i128::from(original_price_cents) * i128::from(BOOK_PRICE_RATE_BPS)
        / i128::from(BPS_DENOMINATOR);
    // |discounted| <= |original|, so the conversion cannot fail.
    i64::try_from(discounted).unwrap_or(original_price_cents)
}

/// The charge for a multi-chapter purchase.
#[derive(Debug, Clone)]
pub struct BatchQuote<'a> {
    /// Chapters that will be charged, in input order.
    pub eligible: Vec<&'a Chapter>,

    /// Chapters left out of the charge.
    pub skipped: Vec<SkippedChapter>,

    /// Sum of eligible chapter prices.
    pub total_price_cents: i64,
}

impl BatchQuote<'_> {
    /// Whether nothing would be charged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }
}

/// Price a batch of chapters for a user who already owns `owned`.
///
/// Free and owned chapters are skipped rather than rejected. A chapter that is
/// both free and owned is reported as free.
#[must_use]
pub fn quote_batch<'a>(chapters: &'a [Chapter], owned: &HashSet<ChapterId>) -> BatchQuote<'a> {
    let mut eligible = Vec::with_capacity(chapters.len());
    let mut skipped = Vec::new();
    let mut total_price_cents: i64 = 0;

    for chapter in chapters {
        let reason = if chapter.is_free {
            Some(SkipReason::Free)
        } else if owned.contains(&chapter.id) {
            Some(SkipReason::AlreadyOwned)
        } else {
            None
        };

        match reason {
            Some(reason) => skipped.push(SkippedChapter {
                chapter_id: chapter.id,
                reason,
            }),
            None => {
                total_price_cents = total_price_cents.saturating_add(chapter_price(chapter));
                eligible.push(chapter);
            }
        }
    }

    BatchQuote {
        eligible,
        skipped,
        total_price_cents,
    }
}

/// The charge for a whole-book purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookQuote {
    /// Sum of all paid chapter prices.
    pub original_price_cents: i64,

    /// Amount actually charged.
    pub discounted_price_cents: i64,

    /// Discount in basis points of the original price.
    pub discount_bps: u32,

    /// Number of paid chapters priced.
    pub paid_chapters: usize,
}

/// Price a whole book from its current chapter set.
///
/// Free chapters are ignored; prior ownership of individual chapters is not
/// taken into account.
#[must_use]
pub fn quote_book(chapters: &[Chapter]) -> BookQuote {
    let (original_price_cents, paid_chapters) = chapters
        .iter()
        .filter(|chapter| !chapter.is_free)
        .fold((0_i64, 0_usize), |(sum, count), chapter| {
            (sum.saturating_add(chapter.price_cents), count + 1)
        });

    BookQuote {
        original_price_cents,
        discounted_price_cents: apply_book_discount(original_price_cents),
        discount_bps: BPS_DENOMINATOR - BOOK_PRICE_RATE_BPS,
        paid_chapters,
    }
}

/// Convert minor units to display units.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_display_units(cents: i64) -> f64 {
    cents as f64 / MINOR_UNITS_PER_UNIT as f64
}

/// Render minor units as a fixed two-decimal amount, e.g. `"8.97"`.
#[must_use]
pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let per_unit = MINOR_UNITS_PER_UNIT.unsigned_abs();
    format!("{sign}{}.{:02}", abs / per_unit, abs % per_unit)
}

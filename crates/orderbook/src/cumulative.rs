//! Running-total projections over an ordered side view.

use rust_decimal::Decimal;

use crate::level::{CumulativeLevel, PriceLevel};

/// Pairs each level with the running sum of *prices* from the best level
/// outward: `[p1, p1 + p2, p1 + p2 + p3, ...]`.
///
/// This is the total the book display has always shown. It is not a depth
/// figure; see [`cumulative_depth`] for the size-based running total.
///
/// Totals saturate at the `Decimal` bounds.
pub fn cumulative_totals<I>(levels: I) -> Vec<CumulativeLevel>
where
    I: IntoIterator<Item = PriceLevel>,
{
    running_total(levels, |level| level.price)
}

/// Pairs each level with the running sum of *sizes* from the best level
/// outward, the conventional depth-chart total.
pub fn cumulative_depth<I>(levels: I) -> Vec<CumulativeLevel>
where
    I: IntoIterator<Item = PriceLevel>,
{
    running_total(levels, |level| level.size)
}

fn running_total<I, F>(levels: I, mut term: F) -> Vec<CumulativeLevel>
where
    I: IntoIterator<Item = PriceLevel>,
    F: FnMut(&PriceLevel) -> Decimal,
{
    let mut total = Decimal::ZERO;
    levels
        .into_iter()
        .map(|level| {
            total = total.saturating_add(term(&level));
            CumulativeLevel {
                price: level.price,
                size: level.size,
                total,
            }
        })
        .collect()
}

//! One side of the book: a price-keyed map of resting sizes.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::level::PriceLevel;

/// Book side. Bids enumerate highest price first, asks lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bids,
    Asks,
}

impl Side {
    /// Returns true if `a` is strictly better than `b` on this side.
    pub fn is_better(&self, a: Decimal, b: Decimal) -> bool {
        match self {
            Side::Bids => a > b,
            Side::Asks => a < b,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bids => f.pad("bids"),
            Side::Asks => f.pad("asks"),
        }
    }
}

/// Resting price levels for one side of the book.
///
/// Stored ascending in a `BTreeMap`; the side's best-first order is applied
/// when the ladder is enumerated.
#[derive(Debug, Clone)]
pub struct PriceLadder {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl PriceLadder {
    /// Creates an empty ladder for `side`.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Sets the resting size at `price`.
    ///
    /// `size` is the absolute quantity, not an increment. Zero removes the
    /// level; removing an absent price is a no-op.
    pub fn apply_delta(&mut self, price: Decimal, size: Decimal) {
        if size.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, size);
        }
    }

    /// Replaces the ladder contents with `levels`, applied in order.
    pub fn bootstrap(&mut self, levels: &[(Decimal, Decimal)]) {
        self.levels.clear();
        for (price, size) in levels {
            self.apply_delta(*price, *size);
        }
    }

    /// Point-in-time copy of the ladder in best-first order.
    ///
    /// The view owns its levels, so later mutation of the ladder never
    /// affects it.
    pub fn ordered_view(&self) -> OrderedView {
        OrderedView {
            side: self.side,
            levels: self.iter_best_first().collect(),
        }
    }

    /// Best price level on this side.
    pub fn best(&self) -> Option<PriceLevel> {
        self.iter_best_first().next()
    }

    /// The first `n` levels, best first.
    pub fn top(&self, n: usize) -> Vec<PriceLevel> {
        self.iter_best_first().take(n).collect()
    }

    /// Resting size at exactly `price`, if any.
    pub fn size_at(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// Total size at `price` and every better price.
    pub fn depth_through(&self, price: Decimal) -> Decimal {
        let sizes: Box<dyn Iterator<Item = (&Decimal, &Decimal)> + '_> = match self.side {
            Side::Bids => Box::new(self.levels.range(price..)),
            Side::Asks => Box::new(self.levels.range(..=price)),
        };
        sizes.fold(Decimal::ZERO, |total, (_, size)| total.saturating_add(*size))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    fn iter_best_first(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let levels = self
            .levels
            .iter()
            .map(|(price, size)| PriceLevel::new(*price, *size));
        match self.side {
            Side::Bids => Box::new(levels.rev()),
            Side::Asks => Box::new(levels),
        }
    }
}

/// Sorted, owned snapshot of one side. Iterate it as many times as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedView {
    side: Side,
    levels: Vec<PriceLevel>,
}

impl OrderedView {
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn iter(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.levels.iter().copied()
    }

    pub fn as_slice(&self) -> &[PriceLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn into_vec(self) -> Vec<PriceLevel> {
        self.levels
    }
}

impl<'a> IntoIterator for &'a OrderedView {
    type Item = PriceLevel;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, PriceLevel>>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.iter().copied()
    }
}

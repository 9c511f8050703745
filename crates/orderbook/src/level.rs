//! Price level representation.

use rust_decimal::Decimal;

/// Total resting size at a single price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    /// The price at this level.
    pub price: Decimal,
    /// The total size resting at this price. Never zero inside a book.
    pub size: Decimal,
}

impl PriceLevel {
    /// Creates a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// A price level paired with a running total over its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeLevel {
    pub price: Decimal,
    pub size: Decimal,
    pub total: Decimal,
}

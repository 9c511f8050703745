//! Two-sided order book built from a snapshot and kept current by deltas.

use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::debug;

use crate::cumulative::cumulative_totals;
use crate::error::OrderBookError;
use crate::ladder::{OrderedView, PriceLadder, Side};
use crate::level::{CumulativeLevel, PriceLevel};

/// Local order book for a single product.
///
/// Each side is a [`PriceLadder`] keyed by `Decimal` price, so no precision
/// is lost to `f64` and price equality is exact.
#[derive(Debug, Clone)]
pub struct OrderBook {
    product_id: String,
    bids: PriceLadder,
    asks: PriceLadder,
    /// Whether the book has been bootstrapped with a snapshot.
    initialized: bool,
    /// Level updates applied since the last bootstrap.
    deltas_applied: u64,
}

impl OrderBook {
    /// Creates a new empty order book for the given product.
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            bids: PriceLadder::new(Side::Bids),
            asks: PriceLadder::new(Side::Asks),
            initialized: false,
            deltas_applied: 0,
        }
    }

    /// Creates a book already bootstrapped from a snapshot.
    pub fn from_snapshot(
        product_id: impl Into<String>,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Self {
        let mut book = Self::new(product_id);
        book.bootstrap(bids, asks);
        book
    }

    /// Returns the product this order book tracks.
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Returns whether the order book has been bootstrapped.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Level updates applied since the last bootstrap.
    pub fn deltas_applied(&self) -> u64 {
        self.deltas_applied
    }

    /// Replaces both sides with a full snapshot.
    ///
    /// Zero-size entries are accepted and contribute nothing.
    pub fn bootstrap(&mut self, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) {
        self.bids.bootstrap(bids);
        self.asks.bootstrap(asks);
        self.initialized = true;
        self.deltas_applied = 0;

        debug!(
            product = %self.product_id,
            bid_levels = self.bids.len(),
            ask_levels = self.asks.len(),
            "order book bootstrapped"
        );
    }

    /// Applies one absolute-size update to `side`.
    ///
    /// Returns an error, leaving the book untouched, if the book has not
    /// been bootstrapped yet.
    pub fn apply_delta(
        &mut self,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<(), OrderBookError> {
        if !self.initialized {
            return Err(OrderBookError::StaleDeltaBeforeBootstrap);
        }
        self.ladder_mut(side).apply_delta(price, size);
        self.deltas_applied += 1;
        Ok(())
    }

    /// Applies every level of one feed message: asks, then bids, each in the
    /// order given.
    ///
    /// Returns the number of level updates applied.
    pub fn apply_update(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Result<usize, OrderBookError> {
        if !self.initialized {
            return Err(OrderBookError::StaleDeltaBeforeBootstrap);
        }

        for (price, size) in asks {
            self.asks.apply_delta(*price, *size);
        }
        for (price, size) in bids {
            self.bids.apply_delta(*price, *size);
        }

        let applied = bids.len() + asks.len();
        self.deltas_applied += applied as u64;
        Ok(applied)
    }

    /// Borrow one side of the book.
    pub fn side(&self, side: Side) -> &PriceLadder {
        match side {
            Side::Bids => &self.bids,
            Side::Asks => &self.asks,
        }
    }

    /// Point-in-time ordered copy of one side, best price first.
    pub fn ordered_view(&self, side: Side) -> OrderedView {
        self.side(side).ordered_view()
    }

    /// Ordered view of one side with the running price total.
    pub fn cumulative_view(&self, side: Side) -> Vec<CumulativeLevel> {
        cumulative_totals(self.side(side).ordered_view().into_vec())
    }

    /// Returns the best (highest) bid price level.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    /// Returns the best (lowest) ask price level.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    /// Returns the mid price (average of best bid and best ask).
    ///
    /// `None` if either side is empty or the sum is out of `Decimal` range.
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(bid.price.checked_add(ask.price)? / Decimal::TWO)
    }

    /// Returns the spread (best ask - best bid).
    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        ask.price.checked_sub(bid.price)
    }

    /// Returns the spread in basis points of the mid price.
    pub fn spread_bps(&self) -> Option<Decimal> {
        let spread = self.spread()?;
        let mid = self.mid_price()?;
        if mid.is_zero() {
            return None;
        }
        spread.checked_div(mid)?.checked_mul(Decimal::from(10000))
    }

    /// Returns the top N bid price levels (highest to lowest).
    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        self.bids.top(n)
    }

    /// Returns the top N ask price levels (lowest to highest).
    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        self.asks.top(n)
    }

    /// Total bid size at or above the given price.
    pub fn bid_depth_at(&self, price: Decimal) -> Decimal {
        self.bids.depth_through(price)
    }

    /// Total ask size at or below the given price.
    pub fn ask_depth_at(&self, price: Decimal) -> Decimal {
        self.asks.depth_through(price)
    }

    /// Returns the total number of bid levels.
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Returns the total number of ask levels.
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Clears all data and resets the order book to the un-bootstrapped state.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.initialized = false;
        self.deltas_applied = 0;
    }

    fn ladder_mut(&mut self, side: Side) -> &mut PriceLadder {
        match side {
            Side::Bids => &mut self.bids,
            Side::Asks => &mut self.asks,
        }
    }
}

/// Order book shared between the feed task (writer) and readers.
///
/// Writers hold the lock for a whole message, so readers never observe a
/// partially applied update.
pub type SharedOrderBook = Arc<RwLock<OrderBook>>;

pub fn create_shared_book(product_id: impl Into<String>) -> SharedOrderBook {
    Arc::new(RwLock::new(OrderBook::new(product_id)))
}

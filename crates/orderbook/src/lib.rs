//! Local order book maintained from a snapshot and absolute-size deltas.
//!
//! Each side is a `BTreeMap` keyed by `Decimal` price. Ordering is applied
//! when a side is enumerated: bids highest first, asks lowest first.
//!
//! # Example
//!
//! ```rust
//! use orderbook::{cumulative_totals, OrderBook, Side};
//! use rust_decimal_macros::dec;
//!
//! let mut book = OrderBook::new("PI_XBTUSD");
//!
//! // Bootstrap from the initial snapshot
//! let bids = vec![(dec!(100.0), dec!(5.0)), (dec!(99.0), dec!(3.0))];
//! let asks = vec![(dec!(101.0), dec!(2.0))];
//! book.bootstrap(&bids, &asks);
//!
//! // A zero size removes the level
//! book.apply_delta(Side::Bids, dec!(100.0), dec!(0)).unwrap();
//!
//! let view = book.ordered_view(Side::Bids);
//! for level in cumulative_totals(view.iter()) {
//!     println!("{} {} {}", level.price, level.size, level.total);
//! }
//! ```

mod book;
mod cumulative;
mod error;
mod ladder;
mod level;

pub use book::{create_shared_book, OrderBook, SharedOrderBook};
pub use cumulative::{cumulative_depth, cumulative_totals};
pub use error::OrderBookError;
pub use ladder::{OrderedView, PriceLadder, Side};
pub use level::{CumulativeLevel, PriceLevel};

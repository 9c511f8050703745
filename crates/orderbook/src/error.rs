//! Order book error types.

use thiserror::Error;

/// Errors that can occur during order book operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderBookError {
    /// A delta arrived before the book was bootstrapped from a snapshot.
    #[error("order book not bootstrapped - delta has no baseline and was discarded")]
    StaleDeltaBeforeBootstrap,
}

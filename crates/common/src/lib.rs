//! Shared utilities for the order book workspace.

mod environment;

pub use environment::{FeedEnvironment, ParseEnvironmentError};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// The filter is read from `RUST_LOG` and falls back to `info`. Calling this
/// more than once is harmless; later calls leave the first subscriber in place.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

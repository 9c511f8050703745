use connector_core::{create_event_channel, ConnectorConfig};
use connector_cryptofacilities::run_connector;
use metrics::create_metrics;
use model::BookEvent;
use orderbook::{create_shared_book, CumulativeLevel, OrderBook, Side};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Levels rendered per side.
const RENDER_DEPTH: usize = 10;

#[tokio::main]
async fn main() {
    common::init_logging();

    let mut config = ConnectorConfig::from_env();

    // Positional args override FEED_PRODUCT_IDS
    let products = std::env::args().skip(1).collect::<Vec<_>>();
    if !products.is_empty() {
        config.product_ids = products;
    }

    let Some(product_id) = config.primary_product().map(str::to_string) else {
        error!("No product id configured");
        return;
    };

    info!(
        product = %product_id,
        environment = %config.environment,
        url = %config.url,
        feed = %config.feed_id,
        threshold = config.message_threshold,
        "Starting book feed"
    );

    let book = create_shared_book(product_id);
    let (sender, mut receiver) = create_event_channel(config.channel_capacity);

    // Create metrics
    let metrics = create_metrics();

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn connector task
    let connector_book = book.clone();
    let connector_metrics = metrics.clone();
    let connector_handle = tokio::spawn(async move {
        if let Err(e) =
            run_connector(config, connector_book, sender, shutdown_rx, connector_metrics).await
        {
            error!(error = %e, "Connector error");
        }
    });

    // Spawn ctrl_c handler
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown");
            let _ = shutdown_tx_clone.send(true);
        }
    });

    // Spawn periodic health reporter
    let health_metrics = metrics.clone();
    let mut health_shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = health_metrics.snapshot();
                    let status = snapshot.health_status();
                    info!(
                        status = %status,
                        messages = snapshot.messages_received,
                        updates = snapshot.book_updates,
                        updates_per_sec = format!("{:.1}", snapshot.updates_per_second),
                        errors = snapshot.parse_errors + snapshot.malformed_levels,
                        disconnects = snapshot.disconnects,
                        "Health check"
                    );
                }
                changed = health_shutdown_rx.changed() => {
                    if changed.is_err() || *health_shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // Re-render the book after every mutation
    while let Some(event) = receiver.recv().await {
        match event {
            BookEvent::Bootstrapped { .. } | BookEvent::Updated { .. } => {
                let rendered = render_book(&book.read(), RENDER_DEPTH);
                println!("{}", rendered);
            }
            BookEvent::Closed { product_id, reason } => {
                info!(product = %product_id, reason = ?reason, "Feed closed");
            }
        }
    }

    info!("Event channel closed, waiting for connector to finish");

    // Stop the health reporter
    let _ = shutdown_tx.send(true);

    // Wait for connector to finish
    let _ = connector_handle.await;

    // Print final metrics
    let snapshot = metrics.snapshot();
    println!("\n{}", snapshot);

    info!("Shutdown complete");
}

/// Plain-text view of the top `depth` levels per side with running totals.
fn render_book(book: &OrderBook, depth: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} | deltas: {} | spread: {} | mid: {} | bps: {}",
        book.product_id(),
        book.deltas_applied(),
        or_dash(book.spread()),
        or_dash(book.mid_price()),
        or_dash(book.spread_bps().map(|bps| bps.round_dp(2))),
    );

    for side in [Side::Asks, Side::Bids] {
        let _ = writeln!(out, "{:>5} {:>14} {:>14} {:>16}", side, "price", "size", "total");
        let levels: Vec<CumulativeLevel> =
            book.cumulative_view(side).into_iter().take(depth).collect();
        if levels.is_empty() {
            let _ = writeln!(out, "{:>5} (empty)", "");
        }
        for level in levels {
            let _ = writeln!(
                out,
                "{:>5} {:>14} {:>14} {:>16}",
                "", level.price, level.size, level.total
            );
        }
    }

    out
}

fn or_dash(value: Option<Decimal>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_book_limits_depth() {
        let mut book = OrderBook::new("PI_XBTUSD");
        book.bootstrap(
            &[(dec!(100), dec!(5)), (dec!(99), dec!(3)), (dec!(98), dec!(1))],
            &[(dec!(101), dec!(2))],
        );

        let rendered = render_book(&book, 2);

        let header = rendered.lines().next().unwrap();
        assert_eq!(header, "PI_XBTUSD | deltas: 0 | spread: 1 | mid: 100.5 | bps: 99.50");
        assert!(rendered.contains("199"));
        assert!(!rendered.contains(" 98 "));
    }

    #[test]
    fn test_render_empty_book() {
        let book = OrderBook::new("PI_XBTUSD");
        let rendered = render_book(&book, RENDER_DEPTH);
        assert!(rendered.contains("spread: - | mid: - | bps: -"));
        assert_eq!(rendered.matches("(empty)").count(), 2);
    }

    #[test]
    fn test_render_book_with_prices_near_decimal_max() {
        let high = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);
        let low = Decimal::from_i128_with_scale(40_000_000_000_000_000_000_000_000_000, 0);
        let mut book = OrderBook::new("PI_XBTUSD");
        book.bootstrap(&[(high, dec!(1)), (low, dec!(1))], &[(high + dec!(1), dec!(1))]);

        let rendered = render_book(&book, RENDER_DEPTH);

        assert!(rendered.contains("mid: - | bps: -"));
        assert!(rendered.contains(&Decimal::MAX.to_string()));
    }
}

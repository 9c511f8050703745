use connector_core::ConnectorError;
use model::{BookMessage, FeedEvent, FeedEventKind, FeedMessage, PriceLevelUpdate};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

/// Raw book payload. Levels stay as JSON values so that one bad pair can be
/// rejected without losing the rest of the message.
#[derive(Debug, Deserialize)]
struct RawBookMessage {
    feed: String,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    bids: Vec<Value>,
    #[serde(default)]
    asks: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    message: Option<String>,
}

/// Parse one text frame from the feed.
///
/// `feed_id` identifies the subscribed book feed: messages tagged with it
/// are deltas, messages tagged `{feed_id}_snapshot` are snapshots.
pub fn parse_message(text: &str, feed_id: &str) -> Result<FeedMessage, serde_json::Error> {
    let raw: Value = serde_json::from_str(text)?;

    // Status events may also carry a `feed` field, so check them first.
    if raw.get("event").is_some() {
        let event: RawEvent = serde_json::from_value(raw)?;
        return Ok(FeedMessage::Event(FeedEvent {
            kind: event_kind(&event.event),
            message: event.message,
        }));
    }

    let Some(feed) = raw.get("feed").and_then(Value::as_str) else {
        return Ok(FeedMessage::Unknown);
    };

    if feed == "heartbeat" {
        return Ok(FeedMessage::Heartbeat);
    }

    let is_snapshot = feed
        .strip_prefix(feed_id)
        .is_some_and(|rest| rest == "_snapshot");
    if !is_snapshot && feed != feed_id {
        return Ok(FeedMessage::Unknown);
    }

    let book: RawBookMessage = serde_json::from_value(raw)?;
    let book = book_message(book);
    if is_snapshot {
        Ok(FeedMessage::Snapshot(book))
    } else {
        Ok(FeedMessage::Delta(book))
    }
}

fn event_kind(event: &str) -> FeedEventKind {
    match event {
        "info" => FeedEventKind::Info,
        "subscribed" => FeedEventKind::Subscribed,
        "unsubscribed" => FeedEventKind::Unsubscribed,
        "alert" => FeedEventKind::Alert,
        "error" => FeedEventKind::Error,
        _ => FeedEventKind::Other,
    }
}

fn book_message(raw: RawBookMessage) -> BookMessage {
    let (bids, bad_bids) = parse_price_levels(&raw.bids, &raw.feed, "bids");
    let (asks, bad_asks) = parse_price_levels(&raw.asks, &raw.feed, "asks");
    BookMessage {
        feed: raw.feed,
        product_id: raw.product_id,
        bids,
        asks,
        rejected: bad_bids + bad_asks,
    }
}

/// Validate every `[price, size]` pair, keeping the good ones in order.
///
/// Returns the valid levels and the number of rejected pairs.
fn parse_price_levels(levels: &[Value], feed: &str, side: &str) -> (Vec<PriceLevelUpdate>, usize) {
    let mut parsed = Vec::with_capacity(levels.len());
    let mut rejected = 0;

    for level in levels {
        match parse_price_level(level) {
            Ok(update) => parsed.push(update),
            Err(e) => {
                rejected += 1;
                warn!(feed = %feed, side = %side, error = %e, "Dropping price level");
            }
        }
    }

    (parsed, rejected)
}

/// Validate a single `[price, size]` pair.
pub fn parse_price_level(level: &Value) -> Result<PriceLevelUpdate, ConnectorError> {
    let pair = level
        .as_array()
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| {
            ConnectorError::MalformedDelta(format!("expected [price, size], got {level}"))
        })?;

    let price = parse_decimal(&pair[0])?;
    let size = parse_decimal(&pair[1])?;
    if size < Decimal::ZERO {
        return Err(ConnectorError::MalformedDelta(format!(
            "negative size {size} at price {price}"
        )));
    }

    Ok((price, size))
}

/// Convert a JSON number (or numeric string) to `Decimal` through its text,
/// so no binary rounding reaches the book.
fn parse_decimal(value: &Value) -> Result<Decimal, ConnectorError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(ConnectorError::MalformedDelta(format!(
                "not a number: {other}"
            )))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ConnectorError::MalformedDelta(format!("not a number: {value}")))
}

//! Message types exchanged between the feed connector and book consumers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A `(price, size)` pair where size is the new absolute resting quantity.
///
/// A size of zero removes the level.
pub type PriceLevelUpdate = (Decimal, Decimal);

/// Control verb sent to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlEvent {
    Subscribe,
    Unsubscribe,
}

/// Subscribe/unsubscribe request, serialized as
/// `{"event": ..., "feed": ..., "product_ids": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub event: ControlEvent,
    pub feed: String,
    pub product_ids: Vec<String>,
}

impl ControlMessage {
    pub fn subscribe(feed: impl Into<String>, product_ids: &[String]) -> Self {
        Self {
            event: ControlEvent::Subscribe,
            feed: feed.into(),
            product_ids: product_ids.to_vec(),
        }
    }

    pub fn unsubscribe(feed: impl Into<String>, product_ids: &[String]) -> Self {
        Self {
            event: ControlEvent::Unsubscribe,
            feed: feed.into(),
            product_ids: product_ids.to_vec(),
        }
    }

    pub fn is_unsubscribe(&self) -> bool {
        self.event == ControlEvent::Unsubscribe
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Price levels carried by a snapshot or delta message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMessage {
    /// Feed tag the message arrived on.
    pub feed: String,
    /// Instrument the levels belong to, when the feed names one.
    pub product_id: Option<String>,
    pub bids: Vec<PriceLevelUpdate>,
    pub asks: Vec<PriceLevelUpdate>,
    /// Number of pairs dropped because they failed numeric validation.
    pub rejected: usize,
}

impl BookMessage {
    /// Total number of valid level updates in the message.
    pub fn level_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Whether the message belongs to `product_id`.
    ///
    /// Messages without a product tag are assumed to belong to the subscription.
    pub fn is_for(&self, product_id: &str) -> bool {
        self.product_id.as_deref().map_or(true, |p| p == product_id)
    }
}

/// Kind of a feed-level status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEventKind {
    Info,
    Subscribed,
    Unsubscribed,
    Alert,
    Error,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub kind: FeedEventKind,
    pub message: Option<String>,
}

/// A parsed inbound feed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Full book, received once per subscription.
    Snapshot(BookMessage),
    /// Incremental absolute-size updates.
    Delta(BookMessage),
    Event(FeedEvent),
    Heartbeat,
    Unknown,
}

impl FeedMessage {
    /// Short name used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedMessage::Snapshot(_) => "snapshot",
            FeedMessage::Delta(_) => "delta",
            FeedMessage::Event(_) => "event",
            FeedMessage::Heartbeat => "heartbeat",
            FeedMessage::Unknown => "unknown",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, FeedMessage::Snapshot(_))
    }
}

/// Why a streaming session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The configured message count was reached.
    ThresholdReached,
    /// An external stop signal was received.
    Stopped,
}

/// Notification pushed to book consumers after each mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    Bootstrapped {
        product_id: String,
        bid_levels: usize,
        ask_levels: usize,
    },
    Updated {
        product_id: String,
        /// 1-based position of the message within the streaming session.
        message_index: u64,
        levels_applied: usize,
        timestamp_ms: i64,
    },
    Closed {
        product_id: String,
        reason: CloseReason,
    },
}

use std::time::Duration;

use async_trait::async_trait;
use common::FeedEnvironment;
use model::{BookEvent, ControlMessage, FeedMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A single `[price, size]` pair failed numeric validation.
    #[error("Malformed price level: {0}")]
    MalformedDelta(String),

    /// A non-snapshot message arrived while waiting for the snapshot.
    #[error("Unexpected {0} message while awaiting snapshot")]
    UnexpectedMessageDuringBootstrap(&'static str),

    #[error("Feed disconnected")]
    FeedDisconnected,

    #[error("No snapshot received within {0:?}")]
    SnapshotTimeout(Duration),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Shutdown requested")]
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Feed environment; selects the default URL.
    pub environment: FeedEnvironment,
    /// WebSocket endpoint.
    pub url: String,
    /// Feed identifier used in control messages, e.g. `book_ui_1`.
    pub feed_id: String,
    /// Instruments to subscribe to. The first one is the tracked book.
    pub product_ids: Vec<String>,
    /// Messages processed per streaming session before unsubscribing.
    /// Zero disables the cap.
    pub message_threshold: u64,
    /// Upper bound on the wait for the snapshot. `None` waits indefinitely.
    pub snapshot_timeout: Option<Duration>,
    /// Timeout for each WebSocket connection attempt.
    pub connect_timeout: Duration,
    /// Channel buffer capacity.
    pub channel_capacity: usize,
    /// Re-run the snapshot + streaming cycle after a threshold close.
    pub resubscribe: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        let environment = FeedEnvironment::default();
        Self {
            environment,
            url: environment.ws_url().to_string(),
            feed_id: "book_ui_1".to_string(),
            product_ids: vec!["PI_XBTUSD".to_string()],
            message_threshold: 85,
            snapshot_timeout: None,
            connect_timeout: Duration::from_secs(30),
            channel_capacity: 1024,
            resubscribe: false,
        }
    }
}

impl ConnectorConfig {
    /// Build a config from `FEED_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Invalid values are
    /// logged and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("FEED_ENVIRONMENT") {
            match raw.parse::<FeedEnvironment>() {
                Ok(environment) => {
                    config.environment = environment;
                    config.url = environment.ws_url().to_string();
                }
                Err(e) => warn!(error = %e, "Ignoring FEED_ENVIRONMENT"),
            }
        }
        if let Some(url) = lookup("FEED_URL").filter(|v| !v.trim().is_empty()) {
            config.url = url.trim().to_string();
        }
        if let Some(feed_id) = lookup("FEED_ID").filter(|v| !v.trim().is_empty()) {
            config.feed_id = feed_id.trim().to_string();
        }
        if let Some(raw) = lookup("FEED_PRODUCT_IDS") {
            let products: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if products.is_empty() {
                warn!(value = %raw, "Ignoring empty FEED_PRODUCT_IDS");
            } else {
                config.product_ids = products;
            }
        }
        if let Some(raw) = lookup("FEED_MESSAGE_THRESHOLD") {
            match raw.trim().parse::<u64>() {
                Ok(threshold) => config.message_threshold = threshold,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring FEED_MESSAGE_THRESHOLD"),
            }
        }
        if let Some(raw) = lookup("FEED_SNAPSHOT_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.snapshot_timeout = None,
                Ok(secs) => config.snapshot_timeout = Some(Duration::from_secs(secs)),
                Err(e) => warn!(value = %raw, error = %e, "Ignoring FEED_SNAPSHOT_TIMEOUT_SECS"),
            }
        }
        if let Some(raw) = lookup("FEED_RESUBSCRIBE") {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.resubscribe = true,
                "0" | "false" | "no" | "off" => config.resubscribe = false,
                _ => warn!(value = %raw, "Ignoring FEED_RESUBSCRIBE"),
            }
        }

        config
    }

    /// The product whose book is maintained.
    pub fn primary_product(&self) -> Option<&str> {
        self.product_ids.first().map(String::as_str)
    }

    /// Feed tag carried by snapshot messages.
    pub fn snapshot_feed(&self) -> String {
        format!("{}_snapshot", self.feed_id)
    }

    pub fn subscribe_message(&self) -> ControlMessage {
        ControlMessage::subscribe(&self.feed_id, &self.product_ids)
    }

    pub fn unsubscribe_message(&self) -> ControlMessage {
        ControlMessage::unsubscribe(&self.feed_id, &self.product_ids)
    }
}

/// Opens connections to a market-data feed.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    type Connection: FeedConnection;

    async fn connect(&self) -> Result<Self::Connection, ConnectorError>;
}

/// One open feed connection, delivering typed messages in arrival order.
#[async_trait]
pub trait FeedConnection: Send {
    /// Queue a control message for delivery. Never blocks.
    fn send(&mut self, control: &ControlMessage) -> Result<(), ConnectorError>;

    /// Next inbound message. `None` once the connection is gone.
    ///
    /// `Err(ConnectorError::Parse)` reports an undecodable frame and the
    /// connection stays usable; other errors precede the end of the stream.
    async fn recv(&mut self) -> Option<Result<FeedMessage, ConnectorError>>;

    /// Deliver queued control messages, then close and wait for the close
    /// to finish.
    async fn close(&mut self) -> Result<(), ConnectorError>;

    /// Start the same close sequence as [`FeedConnection::close`] without
    /// waiting for it. Used where teardown cannot await.
    fn abort(&mut self);
}

pub type EventSender = mpsc::Sender<BookEvent>;
pub type EventReceiver = mpsc::Receiver<BookEvent>;

pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

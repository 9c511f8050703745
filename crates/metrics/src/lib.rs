use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe metrics collector for the book feed.
#[derive(Debug)]
pub struct FeedMetrics {
    // Counters
    messages_received: AtomicU64,
    snapshots_received: AtomicU64,
    book_updates: AtomicU64,
    levels_applied: AtomicU64,
    malformed_levels: AtomicU64,
    parse_errors: AtomicU64,
    unexpected_bootstrap_messages: AtomicU64,
    stale_deltas_discarded: AtomicU64,
    disconnects: AtomicU64,

    // Timestamps
    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_update_time: Option<Instant>,
    last_error_time: Option<Instant>,
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            snapshots_received: AtomicU64::new(0),
            book_updates: AtomicU64::new(0),
            levels_applied: AtomicU64::new(0),
            malformed_levels: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            unexpected_bootstrap_messages: AtomicU64::new(0),
            stale_deltas_discarded: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_update_time: None,
                last_error_time: None,
            }),
        }
    }

    // --- Increment methods ---

    pub fn inc_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_snapshots_received(&self) {
        self.snapshots_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_update_time = Some(Instant::now());
    }

    /// Record one applied feed message carrying `levels` level updates.
    pub fn record_book_update(&self, levels: usize) {
        self.book_updates.fetch_add(1, Ordering::Relaxed);
        self.levels_applied
            .fetch_add(levels as u64, Ordering::Relaxed);
        self.inner.write().last_update_time = Some(Instant::now());
    }

    pub fn add_malformed_levels(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.malformed_levels
            .fetch_add(count as u64, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_unexpected_bootstrap_messages(&self) {
        self.unexpected_bootstrap_messages
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stale_deltas_discarded(&self) {
        self.stale_deltas_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_disconnects(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    // --- Getter methods ---

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn snapshots_received(&self) -> u64 {
        self.snapshots_received.load(Ordering::Relaxed)
    }

    pub fn book_updates(&self) -> u64 {
        self.book_updates.load(Ordering::Relaxed)
    }

    pub fn levels_applied(&self) -> u64 {
        self.levels_applied.load(Ordering::Relaxed)
    }

    pub fn malformed_levels(&self) -> u64 {
        self.malformed_levels.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn unexpected_bootstrap_messages(&self) -> u64 {
        self.unexpected_bootstrap_messages.load(Ordering::Relaxed)
    }

    pub fn stale_deltas_discarded(&self) -> u64 {
        self.stale_deltas_discarded.load(Ordering::Relaxed)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_update(&self) -> Option<f64> {
        self.inner
            .read()
            .last_update_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Book updates per second since start.
    pub fn updates_per_second(&self) -> f64 {
        let uptime = self.uptime_secs();
        if uptime > 0.0 {
            self.book_updates() as f64 / uptime
        } else {
            0.0
        }
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received(),
            snapshots_received: self.snapshots_received(),
            book_updates: self.book_updates(),
            levels_applied: self.levels_applied(),
            malformed_levels: self.malformed_levels(),
            parse_errors: self.parse_errors(),
            unexpected_bootstrap_messages: self.unexpected_bootstrap_messages(),
            stale_deltas_discarded: self.stale_deltas_discarded(),
            disconnects: self.disconnects(),
            uptime_secs: self.uptime_secs(),
            updates_per_second: self.updates_per_second(),
            secs_since_last_update: self.secs_since_last_update(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub snapshots_received: u64,
    pub book_updates: u64,
    pub levels_applied: u64,
    pub malformed_levels: u64,
    pub parse_errors: u64,
    pub unexpected_bootstrap_messages: u64,
    pub stale_deltas_discarded: u64,
    pub disconnects: u64,
    pub uptime_secs: f64,
    pub updates_per_second: f64,
    pub secs_since_last_update: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health status of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Book is receiving updates.
    Healthy,
    /// Book updates are stale.
    Degraded,
    /// No book updates for an extended period.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// Threshold in seconds for considering the book stale (degraded).
    const STALE_THRESHOLD_SECS: f64 = 30.0;
    /// Threshold in seconds for considering the feed unhealthy.
    const UNHEALTHY_THRESHOLD_SECS: f64 = 60.0;

    /// Determine the health status based on metrics.
    pub fn health_status(&self) -> HealthStatus {
        // Before the first update the uptime stands in for the staleness.
        let secs = self.secs_since_last_update.unwrap_or(self.uptime_secs);

        if secs > Self::UNHEALTHY_THRESHOLD_SECS {
            HealthStatus::Unhealthy
        } else if secs > Self::STALE_THRESHOLD_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Feed Metrics ===")?;
        writeln!(f, "Uptime:              {:.1}s", self.uptime_secs)?;
        writeln!(f, "Messages received:   {}", self.messages_received)?;
        writeln!(f, "Snapshots received:  {}", self.snapshots_received)?;
        writeln!(f, "Book updates:        {}", self.book_updates)?;
        writeln!(f, "Levels applied:      {}", self.levels_applied)?;
        writeln!(f, "Updates/sec:         {:.2}", self.updates_per_second)?;
        writeln!(f, "Malformed levels:    {}", self.malformed_levels)?;
        writeln!(f, "Parse errors:        {}", self.parse_errors)?;
        writeln!(
            f,
            "Ignored in bootstrap: {}",
            self.unexpected_bootstrap_messages
        )?;
        writeln!(f, "Stale deltas:        {}", self.stale_deltas_discarded)?;
        writeln!(f, "Disconnects:         {}", self.disconnects)?;
        if let Some(secs) = self.secs_since_last_update {
            writeln!(f, "Since last update:   {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:    {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<FeedMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(FeedMetrics::new())
}

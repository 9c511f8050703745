//! Two-phase subscription lifecycle.
//!
//! 1. Snapshot phase: connect, subscribe, wait for the one snapshot message,
//!    unsubscribe, close, bootstrap the book.
//! 2. Streaming phase: connect again, subscribe, apply every message as
//!    deltas in arrival order, unsubscribe after the configured message count.
//!
//! Every exit path from either phase sends unsubscribe before the connection
//! is closed. A dropped stream is reported as `FeedDisconnected`; deltas are
//! only meaningful against a known snapshot, so recovery means running both
//! phases again.

use connector_core::{ConnectorConfig, ConnectorError, EventSender, FeedConnection, FeedTransport};
use metrics::SharedMetrics;
use model::{BookEvent, BookMessage, CloseReason, ControlMessage, FeedEventKind, FeedMessage};
use orderbook::SharedOrderBook;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    AwaitingSnapshot,
    Bootstrapped,
    Streaming,
    Closed,
}

/// An open connection with an active subscription.
///
/// `release` unsubscribes and closes. If the guard is dropped unreleased
/// (panic, cancelled future) the unsubscribe is queued and the connection
/// is closed without waiting.
pub struct Subscription<C: FeedConnection> {
    connection: Option<C>,
    unsubscribe: ControlMessage,
}

impl<C: FeedConnection> Subscription<C> {
    /// Send `subscribe` on `connection` and take ownership of it.
    pub fn open(
        mut connection: C,
        subscribe: &ControlMessage,
        unsubscribe: ControlMessage,
    ) -> Result<Self, ConnectorError> {
        if let Err(e) = connection.send(subscribe) {
            connection.abort();
            return Err(e);
        }
        Ok(Self {
            connection: Some(connection),
            unsubscribe,
        })
    }

    pub async fn recv(&mut self) -> Option<Result<FeedMessage, ConnectorError>> {
        match self.connection.as_mut() {
            Some(connection) => connection.recv().await,
            None => None,
        }
    }

    /// Unsubscribe, then close the connection.
    ///
    /// Both steps are attempted even if the first fails; the first error is
    /// returned.
    pub async fn release(mut self) -> Result<(), ConnectorError> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        let sent = connection.send(&self.unsubscribe);
        let closed = connection.close().await;
        sent.and(closed)
    }
}

impl<C: FeedConnection> Drop for Subscription<C> {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            warn!(
                feed = %self.unsubscribe.feed,
                "Subscription dropped without release, unsubscribing"
            );
            let _ = connection.send(&self.unsubscribe);
            connection.abort();
        }
    }
}

/// Drives the snapshot and streaming phases against one shared book.
pub struct SubscriptionCoordinator<T: FeedTransport> {
    transport: T,
    config: ConnectorConfig,
    book: SharedOrderBook,
    events: EventSender,
    metrics: SharedMetrics,
    state: watch::Sender<SubscriptionState>,
}

impl<T: FeedTransport> SubscriptionCoordinator<T> {
    pub fn new(
        transport: T,
        config: ConnectorConfig,
        book: SharedOrderBook,
        events: EventSender,
        metrics: SharedMetrics,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::AwaitingSnapshot);
        Self {
            transport,
            config,
            book,
            events,
            metrics,
            state,
        }
    }

    /// Watch lifecycle state transitions.
    pub fn state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn book(&self) -> &SharedOrderBook {
        &self.book
    }

    /// Run the snapshot phase, then the streaming phase.
    pub async fn run(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<CloseReason, ConnectorError> {
        self.bootstrap(shutdown_rx).await?;
        self.stream(shutdown_rx).await
    }

    /// Snapshot phase: acquire one snapshot and bootstrap the book from it.
    pub async fn bootstrap(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        self.set_state(SubscriptionState::AwaitingSnapshot);

        let snapshot = self.acquire_snapshot(shutdown_rx).await?;
        self.metrics.inc_snapshots_received();
        self.metrics.add_malformed_levels(snapshot.rejected);

        let (product_id, bid_levels, ask_levels) = {
            let mut book = self.book.write();
            book.bootstrap(&snapshot.bids, &snapshot.asks);
            (
                book.product_id().to_string(),
                book.bid_levels(),
                book.ask_levels(),
            )
        };

        info!(
            product = %product_id,
            bid_levels,
            ask_levels,
            rejected = snapshot.rejected,
            "Order book bootstrapped from snapshot"
        );
        self.set_state(SubscriptionState::Bootstrapped);

        self.emit(BookEvent::Bootstrapped {
            product_id,
            bid_levels,
            ask_levels,
        })
        .await
    }

    /// Open a connection, subscribe, and return the first snapshot for the
    /// tracked product. The subscription is always released before returning.
    pub async fn acquire_snapshot(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<BookMessage, ConnectorError> {
        let connection = self.connect(shutdown_rx).await?;
        let mut subscription = Subscription::open(
            connection,
            &self.config.subscribe_message(),
            self.config.unsubscribe_message(),
        )?;
        debug!(feed = %self.config.feed_id, "Subscribed, awaiting snapshot");

        let result = match self.config.snapshot_timeout {
            Some(limit) => {
                let wait = self.await_snapshot(&mut subscription, shutdown_rx);
                match tokio::time::timeout(limit, wait).await {
                    Ok(result) => result,
                    Err(_) => Err(ConnectorError::SnapshotTimeout(limit)),
                }
            }
            None => self.await_snapshot(&mut subscription, shutdown_rx).await,
        };

        if let Err(e) = subscription.release().await {
            debug!(error = %e, "Snapshot subscription release failed");
        }
        result
    }

    async fn await_snapshot(
        &self,
        subscription: &mut Subscription<T::Connection>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<BookMessage, ConnectorError> {
        let product_id = self.book.read().product_id().to_string();

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown requested while awaiting snapshot");
                        return Err(ConnectorError::Shutdown);
                    }
                }

                msg = subscription.recv() => match msg {
                    Some(Ok(FeedMessage::Snapshot(book))) if book.is_for(&product_id) => {
                        return Ok(book);
                    }
                    Some(Ok(other)) => {
                        let ignored =
                            ConnectorError::UnexpectedMessageDuringBootstrap(other.kind());
                        debug!(error = %ignored, "Ignoring message during bootstrap");
                        self.metrics.inc_unexpected_bootstrap_messages();
                    }
                    Some(Err(ConnectorError::Parse(e))) => {
                        self.metrics.inc_parse_errors();
                        warn!(error = %e, "Failed to parse message");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Feed error while awaiting snapshot");
                    }
                    None => {
                        self.metrics.inc_disconnects();
                        return Err(ConnectorError::FeedDisconnected);
                    }
                }
            }
        }
    }

    /// Streaming phase: apply deltas until the message threshold, a stop
    /// signal, or a disconnect.
    pub async fn stream(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<CloseReason, ConnectorError> {
        if !self.book.read().is_initialized() {
            warn!("Streaming before bootstrap, deltas will be discarded");
        }

        let connection = self.connect(shutdown_rx).await?;
        let mut subscription = Subscription::open(
            connection,
            &self.config.subscribe_message(),
            self.config.unsubscribe_message(),
        )?;
        self.set_state(SubscriptionState::Streaming);
        info!(
            feed = %self.config.feed_id,
            threshold = self.config.message_threshold,
            "Streaming book updates"
        );

        let result = self.pump(&mut subscription, shutdown_rx).await;

        if let Err(e) = subscription.release().await {
            debug!(error = %e, "Streaming subscription release failed");
        }
        self.set_state(SubscriptionState::Closed);

        let reason = result?;
        info!(reason = ?reason, "Streaming session closed");
        let product_id = self.book.read().product_id().to_string();
        self.emit(BookEvent::Closed { product_id, reason }).await?;
        Ok(reason)
    }

    async fn pump(
        &self,
        subscription: &mut Subscription<T::Connection>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<CloseReason, ConnectorError> {
        let threshold = self.config.message_threshold;
        let mut received: u64 = 0;

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(received, "Shutdown requested, leaving stream");
                        return Ok(CloseReason::Stopped);
                    }
                }

                msg = subscription.recv() => {
                    let message = match msg {
                        Some(Ok(message)) => Some(message),
                        Some(Err(ConnectorError::Parse(e))) => {
                            self.metrics.inc_parse_errors();
                            warn!(error = %e, "Failed to parse message");
                            None
                        }
                        Some(Err(e)) => {
                            self.metrics.inc_disconnects();
                            warn!(error = %e, received, "Feed connection failed");
                            return Err(ConnectorError::FeedDisconnected);
                        }
                        None => {
                            self.metrics.inc_disconnects();
                            warn!(received, "Feed stream ended");
                            return Err(ConnectorError::FeedDisconnected);
                        }
                    };

                    received += 1;
                    self.metrics.inc_messages_received();
                    if let Some(message) = message {
                        self.apply_message(message, received).await?;
                    }

                    if threshold > 0 && received >= threshold {
                        info!(received, "Message threshold reached, unsubscribing");
                        return Ok(CloseReason::ThresholdReached);
                    }
                }
            }
        }
    }

    async fn apply_message(
        &self,
        message: FeedMessage,
        message_index: u64,
    ) -> Result<(), ConnectorError> {
        let levels = match message {
            FeedMessage::Snapshot(levels) | FeedMessage::Delta(levels) => levels,
            FeedMessage::Event(event) => {
                match event.kind {
                    FeedEventKind::Alert | FeedEventKind::Error => {
                        warn!(kind = ?event.kind, detail = ?event.message, "Feed event");
                    }
                    _ => debug!(kind = ?event.kind, "Feed event"),
                }
                return Ok(());
            }
            other => {
                trace!(kind = other.kind(), "Skipping message");
                return Ok(());
            }
        };

        self.metrics.add_malformed_levels(levels.rejected);

        let applied = {
            let mut book = self.book.write();
            if !levels.is_for(book.product_id()) {
                trace!(product = ?levels.product_id, "Skipping levels for another product");
                return Ok(());
            }
            book.apply_update(&levels.bids, &levels.asks)
                .map(|applied| (applied, book.product_id().to_string()))
        };

        match applied {
            Ok((levels_applied, product_id)) => {
                self.metrics.record_book_update(levels_applied);
                self.emit(BookEvent::Updated {
                    product_id,
                    message_index,
                    levels_applied,
                    timestamp_ms: chrono::Utc::now().timestamp_millis(),
                })
                .await
            }
            Err(e) => {
                self.metrics.inc_stale_deltas_discarded();
                debug!(error = %e, message_index, "Discarding delta");
                Ok(())
            }
        }
    }

    async fn connect(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<T::Connection, ConnectorError> {
        if *shutdown_rx.borrow() {
            return Err(ConnectorError::Shutdown);
        }
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return Err(ConnectorError::Shutdown);
                }
                self.transport.connect().await
            }

            result = self.transport.connect() => result,
        }
    }

    async fn emit(&self, event: BookEvent) -> Result<(), ConnectorError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ConnectorError::ChannelClosed)
    }

    fn set_state(&self, state: SubscriptionState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connector_core::create_event_channel;
    use metrics::create_metrics;
    use orderbook::{create_shared_book, PriceLevel, Side};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Record {
        Sent {
            connection: usize,
            unsubscribe: bool,
            delivered: usize,
        },
        Closed {
            connection: usize,
        },
        Aborted {
            connection: usize,
        },
    }

    type Log = Arc<Mutex<Vec<Record>>>;

    /// Scripted connection. When the script runs out it either ends the
    /// stream or stays open forever.
    struct MockConnection {
        id: usize,
        script: VecDeque<Result<FeedMessage, ConnectorError>>,
        hold_open: bool,
        delivered: usize,
        log: Log,
    }

    #[async_trait]
    impl FeedConnection for MockConnection {
        fn send(&mut self, control: &ControlMessage) -> Result<(), ConnectorError> {
            self.log.lock().push(Record::Sent {
                connection: self.id,
                unsubscribe: control.is_unsubscribe(),
                delivered: self.delivered,
            });
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<FeedMessage, ConnectorError>> {
            match self.script.pop_front() {
                Some(msg) => {
                    self.delivered += 1;
                    Some(msg)
                }
                None if self.hold_open => std::future::pending().await,
                None => None,
            }
        }

        async fn close(&mut self) -> Result<(), ConnectorError> {
            self.log.lock().push(Record::Closed { connection: self.id });
            Ok(())
        }

        fn abort(&mut self) {
            self.log.lock().push(Record::Aborted { connection: self.id });
        }
    }

    struct MockTransport {
        connections: Mutex<VecDeque<MockConnection>>,
        log: Log,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                connections: Mutex::new(VecDeque::new()),
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn script(self, messages: Vec<FeedMessage>, hold_open: bool) -> Self {
            self.script_results(messages.into_iter().map(Ok).collect(), hold_open)
        }

        fn script_results(
            self,
            messages: Vec<Result<FeedMessage, ConnectorError>>,
            hold_open: bool,
        ) -> Self {
            let id = self.connections.lock().len();
            self.connections.lock().push_back(MockConnection {
                id,
                script: messages.into(),
                hold_open,
                delivered: 0,
                log: self.log.clone(),
            });
            self
        }

        fn log(&self) -> Log {
            self.log.clone()
        }
    }

    #[async_trait]
    impl FeedTransport for MockTransport {
        type Connection = MockConnection;

        async fn connect(&self) -> Result<MockConnection, ConnectorError> {
            self.connections
                .lock()
                .pop_front()
                .ok_or_else(|| ConnectorError::WebSocket("no scripted connection".to_string()))
        }
    }

    fn snapshot() -> FeedMessage {
        FeedMessage::Snapshot(BookMessage {
            feed: "book_ui_1_snapshot".to_string(),
            product_id: Some("PI_XBTUSD".to_string()),
            bids: vec![(dec!(100), dec!(5)), (dec!(99), dec!(3))],
            asks: vec![(dec!(101), dec!(2))],
            rejected: 0,
        })
    }

    fn delta(bids: Vec<(rust_decimal::Decimal, rust_decimal::Decimal)>) -> FeedMessage {
        FeedMessage::Delta(BookMessage {
            feed: "book_ui_1".to_string(),
            product_id: Some("PI_XBTUSD".to_string()),
            bids,
            asks: vec![],
            rejected: 0,
        })
    }

    fn coordinator(
        transport: MockTransport,
        config: ConnectorConfig,
    ) -> (SubscriptionCoordinator<MockTransport>, connector_core::EventReceiver) {
        let (sender, receiver) = create_event_channel(1024);
        let coordinator = SubscriptionCoordinator::new(
            transport,
            config,
            create_shared_book("PI_XBTUSD"),
            sender,
            create_metrics(),
        );
        (coordinator, receiver)
    }

    fn sent_on(log: &Log, connection: usize) -> Vec<Record> {
        log.lock()
            .iter()
            .filter(|r| matches!(r, Record::Sent { connection: c, .. } if *c == connection))
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_bootstrap_ignores_messages_until_snapshot() {
        let info = FeedMessage::Event(model::FeedEvent {
            kind: FeedEventKind::Info,
            message: None,
        });
        let transport = MockTransport::new().script(
            vec![
                info,
                delta(vec![(dec!(500), dec!(1))]),
                snapshot(),
                delta(vec![(dec!(98), dec!(1))]),
            ],
            true,
        );
        let log = transport.log();
        let (coordinator, mut events) = coordinator(transport, ConnectorConfig::default());
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        coordinator.bootstrap(&mut shutdown_rx).await.unwrap();

        let book = coordinator.book().read();
        assert!(book.is_initialized());
        assert_eq!(
            book.ordered_view(Side::Bids).into_vec(),
            vec![
                PriceLevel::new(dec!(100), dec!(5)),
                PriceLevel::new(dec!(99), dec!(3))
            ]
        );
        drop(book);

        assert_eq!(coordinator.current_state(), SubscriptionState::Bootstrapped);
        assert_eq!(coordinator.metrics.unexpected_bootstrap_messages(), 2);
        assert_eq!(
            *log.lock(),
            vec![
                Record::Sent { connection: 0, unsubscribe: false, delivered: 0 },
                Record::Sent { connection: 0, unsubscribe: true, delivered: 3 },
                Record::Closed { connection: 0 },
            ]
        );
        assert!(matches!(
            events.recv().await,
            Some(BookEvent::Bootstrapped { bid_levels: 2, ask_levels: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_unsubscribes_once_after_threshold() {
        let deltas: Vec<FeedMessage> = (0..90)
            .map(|i| delta(vec![(dec!(90) + rust_decimal::Decimal::from(i % 5), dec!(1))]))
            .collect();
        let transport = MockTransport::new()
            .script(vec![snapshot()], true)
            .script(deltas, true);
        let log = transport.log();
        let (coordinator, _events) = coordinator(transport, ConnectorConfig::default());
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let reason = coordinator.run(&mut shutdown_rx).await.unwrap();

        assert_eq!(reason, CloseReason::ThresholdReached);
        assert_eq!(
            sent_on(&log, 1),
            vec![
                Record::Sent { connection: 1, unsubscribe: false, delivered: 0 },
                Record::Sent { connection: 1, unsubscribe: true, delivered: 85 },
            ]
        );
        assert!(log.lock().contains(&Record::Closed { connection: 1 }));
        assert_eq!(coordinator.metrics.messages_received(), 85);
        assert_eq!(coordinator.current_state(), SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn test_stream_applies_deltas_in_order() {
        let transport = MockTransport::new()
            .script(vec![snapshot()], true)
            .script(
                vec![
                    delta(vec![(dec!(100), dec!(0))]),
                    delta(vec![(dec!(98), dec!(4)), (dec!(98), dec!(6))]),
                    FeedMessage::Heartbeat,
                ],
                true,
            );
        let config = ConnectorConfig {
            message_threshold: 3,
            ..Default::default()
        };
        let (coordinator, mut events) = coordinator(transport, config);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        coordinator.run(&mut shutdown_rx).await.unwrap();

        let bids = coordinator.book().read().ordered_view(Side::Bids).into_vec();
        assert_eq!(
            bids,
            vec![
                PriceLevel::new(dec!(99), dec!(3)),
                PriceLevel::new(dec!(98), dec!(6))
            ]
        );

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 4);
        assert!(matches!(
            received[1],
            BookEvent::Updated { message_index: 1, levels_applied: 1, .. }
        ));
        assert!(matches!(
            received[2],
            BookEvent::Updated { message_index: 2, levels_applied: 2, .. }
        ));
        assert!(matches!(
            received[3],
            BookEvent::Closed { reason: CloseReason::ThresholdReached, .. }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_is_surfaced_after_unsubscribe_attempt() {
        let transport = MockTransport::new()
            .script(vec![snapshot()], true)
            .script(vec![delta(vec![(dec!(97), dec!(2))])], false);
        let log = transport.log();
        let (coordinator, _events) = coordinator(transport, ConnectorConfig::default());
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let result = coordinator.run(&mut shutdown_rx).await;

        assert!(matches!(result, Err(ConnectorError::FeedDisconnected)));
        assert_eq!(
            coordinator.book().read().side(Side::Bids).size_at(dec!(97)),
            Some(dec!(2))
        );
        assert_eq!(sent_on(&log, 1).len(), 2);
        assert_eq!(coordinator.metrics.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_stop_signal_unsubscribes_and_closes() {
        let transport = MockTransport::new()
            .script(vec![snapshot()], true)
            .script(vec![delta(vec![(dec!(97), dec!(2))])], true);
        let log = transport.log();
        let (coordinator, _events) = coordinator(transport, ConnectorConfig::default());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        coordinator.bootstrap(&mut shutdown_rx).await.unwrap();

        let mut state_rx = coordinator.state();
        let stop = async {
            state_rx
                .wait_for(|state| *state == SubscriptionState::Streaming)
                .await
                .unwrap();
            shutdown_tx.send(true).unwrap();
        };
        let (result, _) = tokio::join!(coordinator.stream(&mut shutdown_rx), stop);

        assert_eq!(result.unwrap(), CloseReason::Stopped);
        let sent = sent_on(&log, 1);
        assert!(matches!(sent.last(), Some(Record::Sent { unsubscribe: true, .. })));
        assert_eq!(log.lock().last(), Some(&Record::Closed { connection: 1 }));
    }

    #[tokio::test]
    async fn test_delta_before_bootstrap_is_discarded() {
        let transport = MockTransport::new().script(
            vec![delta(vec![(dec!(100), dec!(1))]), delta(vec![(dec!(99), dec!(1))])],
            true,
        );
        let config = ConnectorConfig {
            message_threshold: 2,
            ..Default::default()
        };
        let (coordinator, _events) = coordinator(transport, config);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let reason = coordinator.stream(&mut shutdown_rx).await.unwrap();

        assert_eq!(reason, CloseReason::ThresholdReached);
        assert_eq!(coordinator.book().read().bid_levels(), 0);
        assert_eq!(coordinator.metrics.stale_deltas_discarded(), 2);
    }

    #[tokio::test]
    async fn test_parse_errors_count_toward_threshold() {
        let transport = MockTransport::new().script(vec![snapshot()], true).script_results(
            vec![
                Err(ConnectorError::Parse("bad frame".to_string())),
                Ok(delta(vec![(dec!(96), dec!(1))])),
            ],
            true,
        );
        let config = ConnectorConfig {
            message_threshold: 2,
            ..Default::default()
        };
        let (coordinator, _events) = coordinator(transport, config);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        coordinator.run(&mut shutdown_rx).await.unwrap();

        assert_eq!(coordinator.metrics.parse_errors(), 1);
        assert_eq!(coordinator.book().read().bid_levels(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_timeout() {
        let transport = MockTransport::new().script(vec![FeedMessage::Heartbeat], true);
        let log = transport.log();
        let config = ConnectorConfig {
            snapshot_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let (coordinator, _events) = coordinator(transport, config);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let result = coordinator.bootstrap(&mut shutdown_rx).await;

        assert!(matches!(result, Err(ConnectorError::SnapshotTimeout(_))));
        assert!(!coordinator.book().read().is_initialized());
        assert!(log.lock().contains(&Record::Closed { connection: 0 }));
        assert_eq!(sent_on(&log, 0).len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        let transport = MockTransport::new().script(vec![snapshot()], true);
        let log = transport.log();
        let (coordinator, _events) = coordinator(transport, ConnectorConfig::default());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let result = coordinator.run(&mut shutdown_rx).await;

        assert!(matches!(result, Err(ConnectorError::Shutdown)));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_dropped_subscription_unsubscribes() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let connection = MockConnection {
            id: 7,
            script: VecDeque::new(),
            hold_open: true,
            delivered: 0,
            log: log.clone(),
        };
        let config = ConnectorConfig::default();

        let subscription = Subscription::open(
            connection,
            &config.subscribe_message(),
            config.unsubscribe_message(),
        )
        .unwrap();
        drop(subscription);

        assert_eq!(
            *log.lock(),
            vec![
                Record::Sent { connection: 7, unsubscribe: false, delivered: 0 },
                Record::Sent { connection: 7, unsubscribe: true, delivered: 0 },
                Record::Aborted { connection: 7 },
            ]
        );
    }
}

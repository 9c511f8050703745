use async_trait::async_trait;
use connector_core::{ConnectorConfig, ConnectorError, EventSender, FeedConnection, FeedTransport};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use metrics::SharedMetrics;
use model::{CloseReason, ControlMessage, FeedMessage};
use orderbook::SharedOrderBook;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::parser::parse_message;
use crate::subscription::SubscriptionCoordinator;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Inbound = Result<FeedMessage, ConnectorError>;

/// Commands from the connection owner to its socket task.
enum Outbound {
    Control(String),
    Close,
}

/// Opens WebSocket connections to the feed endpoint.
pub struct WsTransport {
    url: String,
    feed_id: String,
    connect_timeout: Duration,
    channel_capacity: usize,
}

impl WsTransport {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            url: config.url.clone(),
            feed_id: config.feed_id.clone(),
            connect_timeout: config.connect_timeout,
            channel_capacity: config.channel_capacity.max(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    type Connection = WsConnection;

    async fn connect(&self) -> Result<WsConnection, ConnectorError> {
        info!(url = %self.url, "Connecting to feed");

        let connect = connect_async(self.url.as_str());
        let ws_stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => return Err(ConnectorError::WebSocket(e.to_string())),
            Err(_) => return Err(ConnectorError::WebSocket("connection timeout".to_string())),
        };

        info!(url = %self.url, "Connected to feed");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(self.channel_capacity);
        let task = tokio::spawn(run_session(
            ws_stream,
            self.feed_id.clone(),
            outbound_rx,
            inbound_tx,
        ));

        Ok(WsConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
            task: Some(task),
        })
    }
}

/// A live feed connection. The socket itself is owned by a background task;
/// this handle queues control messages and receives parsed frames.
pub struct WsConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::Receiver<Inbound>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    fn send(&mut self, control: &ControlMessage) -> Result<(), ConnectorError> {
        let text = control
            .to_json()
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        debug!(control = %text, "Queueing control message");
        self.outbound
            .send(Outbound::Control(text))
            .map_err(|_| ConnectorError::FeedDisconnected)
    }

    async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        let _ = self.outbound.send(Outbound::Close);
        self.inbound.close();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| ConnectorError::WebSocket(e.to_string())),
            None => Ok(()),
        }
    }

    fn abort(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
        self.inbound.close();
        // The task finishes the close on its own.
        self.task.take();
    }
}

/// Socket task: writes queued control messages, parses inbound text frames.
///
/// Control messages always take priority over reads so an unsubscribe is
/// written before anything that follows it.
async fn run_session(
    ws_stream: WsStream,
    feed_id: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::Sender<Inbound>,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            command = outbound.recv() => match command {
                Some(Outbound::Control(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        error!(error = %e, "Failed to send control message");
                        let _ = inbound.try_send(Err(ConnectorError::WebSocket(e.to_string())));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    close_sink(&mut write).await;
                    return;
                }
            },

            frame = read.next() => {
                let msg = match frame {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        let _ = inbound.send(Err(ConnectorError::WebSocket(e.to_string()))).await;
                        return;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return;
                    }
                };

                match msg {
                    Message::Text(text) => {
                        let parsed = parse_message(&text, &feed_id)
                            .map_err(|e| ConnectorError::Parse(e.to_string()));
                        if inbound.send(parsed).await.is_err() {
                            debug!("Connection owner stopped reading, closing");
                            flush_and_close(&mut write, &mut outbound).await;
                            return;
                        }
                    }
                    Message::Ping(data) => {
                        debug!("Received Ping, sending Pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send Pong");
                            let failed = ConnectorError::WebSocket(e.to_string());
                            let _ = inbound.send(Err(failed)).await;
                            return;
                        }
                    }
                    Message::Close(_) => {
                        info!("WebSocket closed by server");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Write any control messages still queued, then close.
async fn flush_and_close(write: &mut WsSink, outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    while let Ok(command) = outbound.try_recv() {
        match command {
            Outbound::Control(text) => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(error = %e, "Failed to flush control message");
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    close_sink(write).await;
}

async fn close_sink(write: &mut WsSink) {
    if let Err(e) = write.close().await {
        debug!(error = %e, "Close handshake failed");
    }
}

/// Run the snapshot and streaming phases against the configured feed.
///
/// Returns once streaming ends, or loops back to a fresh snapshot after a
/// threshold close when `config.resubscribe` is set. A shutdown signal ends
/// the connector with `Ok`.
pub async fn run_connector(
    config: ConnectorConfig,
    book: SharedOrderBook,
    sender: EventSender,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: SharedMetrics,
) -> Result<(), ConnectorError> {
    let transport = WsTransport::new(&config);
    let resubscribe = config.resubscribe;
    let coordinator = SubscriptionCoordinator::new(transport, config, book, sender, metrics);

    loop {
        match coordinator.run(&mut shutdown_rx).await {
            Ok(CloseReason::ThresholdReached) if resubscribe => {
                info!("Message threshold reached, resubscribing from a fresh snapshot");
            }
            Ok(reason) => {
                info!(reason = ?reason, "Connector finished");
                return Ok(());
            }
            Err(ConnectorError::Shutdown) => {
                info!("Connector shutdown complete");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "Connector stopped");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscription;
    use connector_core::create_event_channel;
    use metrics::create_metrics;
    use orderbook::{create_shared_book, PriceLevel, Side};
    use rust_decimal_macros::dec;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const SNAPSHOT: &str = r#"{"feed":"book_ui_1_snapshot","product_id":"PI_XBTUSD",
        "bids":[[100,5],[99,3]],"asks":[[101,2]]}"#;

    /// Accept one connection, send `frames`, then collect the client's text
    /// frames until it closes.
    async fn serve_one(listener: &TcpListener, frames: &[&str]) -> Vec<String> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }

        let mut received = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => received.push(text),
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    }

    fn events_of(texts: &[String]) -> Vec<String> {
        texts
            .iter()
            .map(|t| {
                let value: serde_json::Value = serde_json::from_str(t).unwrap();
                value["event"].as_str().unwrap().to_string()
            })
            .collect()
    }

    async fn local_config(listener: &TcpListener) -> ConnectorConfig {
        let addr = listener.local_addr().unwrap();
        ConnectorConfig {
            url: format!("ws://{}", addr),
            connect_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connection_delivers_frames_and_unsubscribes_before_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = local_config(&listener).await;
        let server =
            tokio::spawn(async move { serve_one(&listener, &[SNAPSHOT, "garbage"]).await });

        let transport = WsTransport::new(&config);
        let connection = transport.connect().await.unwrap();
        let mut subscription = Subscription::open(
            connection,
            &config.subscribe_message(),
            config.unsubscribe_message(),
        )
        .unwrap();

        match subscription.recv().await {
            Some(Ok(FeedMessage::Snapshot(book))) => assert_eq!(book.bids.len(), 2),
            other => panic!("Expected Snapshot, got {:?}", other),
        }
        assert!(matches!(
            subscription.recv().await,
            Some(Err(ConnectorError::Parse(_)))
        ));
        subscription.release().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(events_of(&received), vec!["subscribe", "unsubscribe"]);
    }

    #[tokio::test]
    async fn test_connect_failure_is_websocket_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = local_config(&listener).await;
        drop(listener);

        let result = WsTransport::new(&config).connect().await;
        assert!(matches!(result, Err(ConnectorError::WebSocket(_))));
    }

    #[tokio::test]
    async fn test_run_connector_against_local_feed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ConnectorConfig {
            message_threshold: 3,
            ..local_config(&listener).await
        };

        let server = tokio::spawn(async move {
            let snapshot_session =
                serve_one(&listener, &[r#"{"event":"info","version":1}"#, SNAPSHOT]).await;
            let stream_session = serve_one(
                &listener,
                &[
                    r#"{"feed":"book_ui_1","product_id":"PI_XBTUSD","bids":[[100,0]]}"#,
                    r#"{"feed":"heartbeat"}"#,
                    r#"{"feed":"book_ui_1","product_id":"PI_XBTUSD","asks":[[102,7]]}"#,
                    r#"{"feed":"book_ui_1","product_id":"PI_XBTUSD","bids":[[50,1]]}"#,
                ],
            )
            .await;
            (snapshot_session, stream_session)
        });

        let book = create_shared_book("PI_XBTUSD");
        let (sender, _events) = create_event_channel(64);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = create_metrics();

        run_connector(config, book.clone(), sender, shutdown_rx, metrics.clone())
            .await
            .unwrap();

        let (snapshot_session, stream_session) = server.await.unwrap();
        assert_eq!(events_of(&snapshot_session), vec!["subscribe", "unsubscribe"]);
        assert_eq!(events_of(&stream_session), vec!["subscribe", "unsubscribe"]);

        let book = book.read();
        assert_eq!(
            book.ordered_view(Side::Bids).into_vec(),
            vec![PriceLevel::new(dec!(99), dec!(3))]
        );
        assert_eq!(
            book.ordered_view(Side::Asks).into_vec(),
            vec![
                PriceLevel::new(dec!(101), dec!(2)),
                PriceLevel::new(dec!(102), dec!(7))
            ]
        );
        assert_eq!(metrics.messages_received(), 3);
        assert_eq!(metrics.snapshots_received(), 1);
    }
}

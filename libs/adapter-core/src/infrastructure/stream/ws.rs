//! WebSocket Stream Connector
//!
//! [`StreamConnector`] implementation over tokio-tungstenite. Each connect
//! opens a fresh socket, authenticates when the kind requires it, sends the
//! subscribe frame carrying the desired key set, and hands the stream to
//! the multiplexer worker with heartbeat monitoring attached.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{InboundStream, RawFrame, StreamConnector, TransportError};
use crate::domain::message::Symbol;
use crate::domain::subscription::SubscriptionKind;
use crate::infrastructure::auth::RequestSigner;
use crate::infrastructure::translate::wire::subscribe_frame;

use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// =============================================================================
// Connector
// =============================================================================

/// Configuration for the WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnectorConfig {
    /// WebSocket endpoint URL.
    pub url: String,
    /// Heartbeat behavior for opened streams.
    pub heartbeat: HeartbeatConfig,
}

impl WsConnectorConfig {
    /// Create a configuration with default heartbeat settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// WebSocket-based [`StreamConnector`].
///
/// Private kinds (own orders, balances) require a signer; its auth frame is
/// sent before the subscribe frame.
pub struct WsStreamConnector {
    config: WsConnectorConfig,
    signer: Option<Arc<RequestSigner>>,
}

impl WsStreamConnector {
    /// Create a connector for public streams only.
    #[must_use]
    pub const fn new(config: WsConnectorConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Attach a signer, enabling private streams.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }
}

#[async_trait]
impl StreamConnector for WsStreamConnector {
    async fn connect(
        &self,
        kind: SubscriptionKind,
        symbols: &[Symbol],
    ) -> Result<Box<dyn InboundStream>, TransportError> {
        tracing::debug!(url = %self.config.url, %kind, "dialing stream endpoint");

        let (socket, _response) = connect_async(&self.config.url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let (mut write, read) = socket.split();

        if kind.is_private() {
            let Some(signer) = &self.signer else {
                return Err(TransportError::ConnectFailed(format!(
                    "{kind} stream requires credentials but no signer is configured"
                )));
            };
            send_text(&mut write, signer.stream_auth_frame()).await?;
        }

        send_text(&mut write, subscribe_frame(kind, symbols)).await?;

        // Heartbeat lives as long as this stream
        let hb_state = Arc::new(HeartbeatState::new());
        let (hb_tx, hb_rx) = mpsc::channel::<HeartbeatEvent>(8);
        let hb_cancel = CancellationToken::new();
        tokio::spawn(
            HeartbeatMonitor::new(
                self.config.heartbeat.clone(),
                Arc::clone(&hb_state),
                hb_tx,
                hb_cancel.clone(),
            )
            .run(),
        );

        Ok(Box::new(WsInboundStream {
            write,
            read,
            hb_state,
            hb_rx,
            hb_cancel,
            hb_done: false,
            pong_timeout: self.config.heartbeat.pong_timeout,
        }))
    }
}

async fn send_text(write: &mut WsSink, payload: String) -> Result<(), TransportError> {
    write
        .send(Message::Text(payload.into()))
        .await
        .map_err(|e| TransportError::Io(e.to_string()))
}

// =============================================================================
// Inbound Stream
// =============================================================================

struct WsInboundStream {
    write: WsSink,
    read: WsSource,
    hb_state: Arc<HeartbeatState>,
    hb_rx: mpsc::Receiver<HeartbeatEvent>,
    hb_cancel: CancellationToken,
    hb_done: bool,
    pong_timeout: std::time::Duration,
}

#[async_trait]
impl InboundStream for WsInboundStream {
    async fn next_frame(&mut self) -> Result<Option<RawFrame>, TransportError> {
        loop {
            tokio::select! {
                event = self.hb_rx.recv(), if !self.hb_done => {
                    match event {
                        Some(HeartbeatEvent::PingDue) => {
                            self.hb_state.ping_sent();
                            self.write
                                .send(Message::Ping(vec![].into()))
                                .await
                                .map_err(|e| TransportError::Io(e.to_string()))?;
                        }
                        Some(HeartbeatEvent::Deadline) => {
                            return Err(TransportError::Timeout(self.pong_timeout));
                        }
                        None => {
                            self.hb_done = true;
                        }
                    }
                }
                message = self.read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.hb_state.pong_received();
                            return Ok(Some(RawFrame::text(text.as_str())));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.hb_state.pong_received();
                            return Ok(Some(RawFrame::binary(data.to_vec())));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| TransportError::Io(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.hb_state.pong_received();
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(None),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        self.hb_cancel.cancel();
        let _ = self.write.close().await;
    }
}

impl Drop for WsInboundStream {
    fn drop(&mut self) {
        self.hb_cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;

    use crate::infrastructure::auth::{Credentials, SignatureEncoding};

    use super::*;

    /// Accept one socket and echo back what a fixture venue would.
    async fn fixture_server(listener: TcpListener, frames_to_send: Vec<String>) -> Vec<String> {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = tokio_tungstenite::accept_async(stream).await.expect("ws");

        let mut received = Vec::new();
        // Collect client frames until the subscribe arrives
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                let is_subscribe = text.as_str().contains("\"subscribe\"");
                received.push(text.as_str().to_string());
                if is_subscribe {
                    break;
                }
            }
        }

        for frame in frames_to_send {
            socket
                .send(Message::Text(frame.into()))
                .await
                .expect("send");
        }

        received
    }

    #[tokio::test]
    async fn public_connect_sends_subscribe_and_reads_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(fixture_server(
            listener,
            vec![r#"[{"T":"tick","S":"BTC-USD","bp":"1"}]"#.to_string()],
        ));

        let connector = WsStreamConnector::new(WsConnectorConfig::new(format!("ws://{addr}")));
        let mut stream = connector
            .connect(SubscriptionKind::Ticker, &["BTC-USD".to_string()])
            .await
            .expect("connect");

        let frame = stream.next_frame().await.expect("read").expect("frame");
        assert!(frame.preview().contains("BTC-USD"));
        stream.close().await;

        let received = server.await.expect("server");
        assert_eq!(received.len(), 1);
        assert!(received[0].contains("\"channel\":\"ticker\""));
        assert!(received[0].contains("BTC-USD"));
    }

    #[tokio::test]
    async fn private_connect_requires_a_signer() {
        let connector = WsStreamConnector::new(WsConnectorConfig::new("ws://127.0.0.1:9"));
        let err = connector
            .connect(SubscriptionKind::UserOrders, &[])
            .await
            .err()
            .expect("must refuse without signer");
        assert!(matches!(err, TransportError::ConnectFailed(_)));
    }

    #[tokio::test]
    async fn private_connect_sends_auth_before_subscribe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(fixture_server(listener, vec![]));

        let signer = Arc::new(RequestSigner::new(
            Credentials::new("key", "secret").expect("credentials"),
            SignatureEncoding::Hex,
        ));
        let connector = WsStreamConnector::new(WsConnectorConfig::new(format!("ws://{addr}")))
            .with_signer(signer);

        let mut stream = connector
            .connect(SubscriptionKind::UserOrders, &[])
            .await
            .expect("connect");
        stream.close().await;

        let received = server.await.expect("server");
        assert_eq!(received.len(), 2);
        assert!(received[0].contains("\"op\":\"auth\""));
        assert!(received[0].contains("\"key\":\"key\""));
        assert!(received[1].contains("\"op\":\"subscribe\""));
    }
}

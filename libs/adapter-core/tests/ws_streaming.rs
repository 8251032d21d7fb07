//! WebSocket Streaming Integration Tests
//!
//! Runs a session against an in-process fixture venue speaking the
//! reference wire dialect over real WebSocket connections: subscribe
//! intents reach the wire, resubscribe cycles carry the full key set, and
//! normalized events come out of the hub.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use adapter_core::{
    AdapterConfig, AdapterSession, CommandAck, CommandClient, Credentials, SignedRequest,
    StreamPhase, SubscriptionKind, TransportError, WireTranslator, WsConnectorConfig,
    WsStreamConnector,
};

// =============================================================================
// Fixture Venue
// =============================================================================

/// Accepts connections; answers each subscribe with one tick per symbol,
/// then keeps the connection open.
async fn run_fixture_venue(listener: TcpListener) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            break;
        };
        tokio::spawn(async move {
            let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            while let Some(Ok(message)) = socket.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
                    continue;
                };
                if value["op"] != "subscribe" {
                    continue;
                }
                for symbol in value["symbols"].as_array().cloned().unwrap_or_default() {
                    let symbol = symbol.as_str().unwrap_or_default();
                    let tick = format!(
                        r#"[{{"T":"tick","S":"{symbol}","bp":"100.5","bs":"1","ap":"101","as":"2","t":1712000000000}}]"#
                    );
                    if socket.send(Message::Text(tick.into())).await.is_err() {
                        return;
                    }
                }
            }
        });
    }
}

struct NoopCommands;

#[async_trait]
impl CommandClient for NoopCommands {
    async fn send(&self, _request: SignedRequest) -> Result<CommandAck, TransportError> {
        Ok(CommandAck {
            request_id: "ext-1".to_string(),
        })
    }
}

async fn session_against_fixture() -> AdapterSession {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(run_fixture_venue(listener));

    let config = AdapterConfig::new(
        Credentials::new("key", "secret").unwrap(),
        format!("ws://{addr}"),
        "http://127.0.0.1:9/api",
    );
    let connector = WsStreamConnector::new(WsConnectorConfig::new(format!("ws://{addr}")));

    AdapterSession::new(
        config,
        Arc::new(connector),
        Arc::new(NoopCommands),
        Arc::new(WireTranslator::default()),
    )
}

async fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
    for _ in 0..1000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for {what}");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn subscribing_brings_the_stream_up_and_delivers_one_event() {
    let session = session_against_fixture().await;
    session.connect().await.unwrap();

    let mut books_rx = session.hub().books_rx();

    assert_eq!(
        session.stream_phase(SubscriptionKind::Ticker),
        Some(StreamPhase::Stopped)
    );
    session.subscribe(SubscriptionKind::Ticker, "BTC-USD").unwrap();

    wait_for("stream started", || {
        session.stream_phase(SubscriptionKind::Ticker) == Some(StreamPhase::Started)
    })
    .await;

    let book = tokio::time::timeout(Duration::from_secs(5), books_rx.recv())
        .await
        .expect("timely delivery")
        .unwrap();
    assert_eq!(book.symbol, "BTC-USD");
    assert_eq!(book.bids[0].price.to_string(), "100.5");
    assert!(!book.server_time.substituted);

    // The fixture sends exactly one tick per subscribe; nothing else shows up
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(books_rx.try_recv().is_err());

    session.reset();
}

#[tokio::test]
async fn adding_a_key_resubscribes_with_the_full_set() {
    let session = session_against_fixture().await;
    session.connect().await.unwrap();

    let mut books_rx = session.hub().books_rx();

    session.subscribe(SubscriptionKind::Ticker, "BTC-USD").unwrap();
    wait_for("first stream up", || {
        session.stream_phase(SubscriptionKind::Ticker) == Some(StreamPhase::Started)
    })
    .await;

    // Second key: the connector recycles the connection and subscribes both
    session.subscribe(SubscriptionKind::Ticker, "ETH-USD").unwrap();

    let mut seen = std::collections::BTreeSet::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while seen.len() < 2 {
        let book = tokio::time::timeout_at(deadline, books_rx.recv())
            .await
            .expect("both symbols before deadline")
            .unwrap();
        seen.insert(book.symbol.clone());
    }
    assert!(seen.contains("BTC-USD"));
    assert!(seen.contains("ETH-USD"));

    session.reset();
}

#[tokio::test]
async fn unsubscribing_the_last_key_winds_the_stream_down() {
    let session = session_against_fixture().await;
    session.connect().await.unwrap();

    session.subscribe(SubscriptionKind::Ticker, "BTC-USD").unwrap();
    wait_for("stream up", || {
        session.stream_phase(SubscriptionKind::Ticker) == Some(StreamPhase::Started)
    })
    .await;

    session.unsubscribe(SubscriptionKind::Ticker, "BTC-USD").unwrap();
    wait_for("stream down", || {
        session.stream_phase(SubscriptionKind::Ticker) == Some(StreamPhase::Stopped)
    })
    .await;
    assert!(session.subscribed(SubscriptionKind::Ticker).is_empty());

    session.reset();
}

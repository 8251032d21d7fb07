//! Connection Lifecycle Controller
//!
//! [`AdapterSession`] is the top-level state machine of one venue adapter:
//! it owns the request signer, the command client, one multiplexer per
//! subscription kind, the transaction correlator, and the outbound message
//! hub.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──handshake ok──► Connected
//!      ▲                          │                            │
//!      │                          └──handshake err──► Failed   │
//!      └────────────── disconnect()/reset() ◄──────────────────┘
//! ```
//!
//! Wrong-state calls fail immediately with a precondition error; nothing is
//! queued. `reset()` is the hard-recovery hatch: valid from any state,
//! idempotent, infallible.
//!
//! # Dispatch and Correlation
//!
//! A single dispatch task drains the frame queue shared by all multiplexer
//! workers, translates each frame, correlates order events, and publishes
//! on the hub. Correlator updates happen strictly before publication, so a
//! caller that observes an event never finds the correlation still pending.
//! Lock order across components is session → multiplexer → correlator,
//! never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{
    CommandClient, CommandPayload, MessageTranslator, StreamConnector, TranslateError,
    TransportError,
};
use crate::domain::message::{
    ConnectionEvent, ConnectionState, ErrorEvent, NormalizedMessage, OrderEvent, OrderIntent,
    Symbol, TransactionId,
};
use crate::domain::subscription::SubscriptionKind;
use crate::infrastructure::auth::RequestSigner;
use crate::infrastructure::broadcast::{HubConfig, MessageHub};
use crate::infrastructure::config::AdapterConfig;
use crate::infrastructure::correlation::{CorrelationError, TransactionCorrelator};
use crate::infrastructure::metrics;
use crate::infrastructure::stream::{StreamEvent, StreamMultiplexer, StreamPhase};

// =============================================================================
// Error Type
// =============================================================================

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not valid in the current connection state.
    #[error("`{operation}` is invalid while {actual} (requires {required})")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the operation requires.
        required: &'static str,
        /// State the session was in.
        actual: ConnectionState,
    },

    /// A transactional operation referenced an id the correlator does not
    /// know. Checked before any network call.
    #[error("unknown transaction id {0}")]
    UnknownTransaction(TransactionId),

    /// Correlator invariant violation.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// Transport failure or venue rejection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The intent could not be encoded for the venue.
    #[error(transparent)]
    Translate(#[from] TranslateError),
}

// =============================================================================
// Session
// =============================================================================

struct SessionRuntime {
    cancel: CancellationToken,
    muxers: HashMap<SubscriptionKind, Arc<StreamMultiplexer>>,
}

/// Top-level controller for one venue adapter session.
///
/// Construct with the venue's transports and translator, then drive through
/// `connect` / `subscribe` / `register_order` / `disconnect` / `reset`.
/// Consumers read normalized events from [`hub`](Self::hub).
pub struct AdapterSession {
    config: AdapterConfig,
    session_id: Uuid,
    signer: Arc<RequestSigner>,
    connector: Arc<dyn StreamConnector>,
    commands: Arc<dyn CommandClient>,
    translator: Arc<dyn MessageTranslator>,
    correlator: Arc<TransactionCorrelator>,
    hub: Arc<MessageHub>,
    state: Mutex<ConnectionState>,
    runtime: Mutex<Option<SessionRuntime>>,
    cancel: CancellationToken,
}

impl AdapterSession {
    /// Create a session. No resources are live until [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        config: AdapterConfig,
        connector: Arc<dyn StreamConnector>,
        commands: Arc<dyn CommandClient>,
        translator: Arc<dyn MessageTranslator>,
    ) -> Self {
        let signer = Arc::new(RequestSigner::new(
            config.credentials.clone(),
            config.signature_encoding,
        ));
        let hub = Arc::new(MessageHub::new(HubConfig::from(&config.channels)));

        Self {
            config,
            session_id: Uuid::new_v4(),
            signer,
            connector,
            commands,
            translator,
            correlator: Arc::new(TransactionCorrelator::new()),
            hub,
            state: Mutex::new(ConnectionState::Disconnected),
            runtime: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Session identity (appears in logs).
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The outbound message hub.
    #[must_use]
    pub fn hub(&self) -> &MessageHub {
        &self.hub
    }

    /// The request signer (shared with stream connectors needing auth
    /// frames).
    #[must_use]
    pub fn signer(&self) -> Arc<RequestSigner> {
        Arc::clone(&self.signer)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Number of transactions awaiting a terminal state.
    #[must_use]
    pub fn pending_transactions(&self) -> usize {
        self.correlator.len()
    }

    /// The venue-assigned id for a transaction, once resolved.
    #[must_use]
    pub fn external_order_id(&self, transaction_id: TransactionId) -> Option<String> {
        self.correlator.external_id(transaction_id)
    }

    /// Phase of the multiplexer owning `kind`, when the session has one.
    #[must_use]
    pub fn stream_phase(&self, kind: SubscriptionKind) -> Option<StreamPhase> {
        self.runtime
            .lock()
            .as_ref()
            .and_then(|rt| rt.muxers.get(&kind))
            .map(|mux| mux.phase())
    }

    /// Desired keys of the multiplexer owning `kind`.
    #[must_use]
    pub fn subscribed(&self, kind: SubscriptionKind) -> Vec<Symbol> {
        self.runtime
            .lock()
            .as_ref()
            .and_then(|rt| rt.muxers.get(&kind))
            .map(|mux| mux.keys())
            .unwrap_or_default()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the session: handshake with the venue and start the stream
    /// workers.
    ///
    /// Valid from Disconnected or Failed. There is no internal retry; the
    /// caller owns retry policy for failed connects.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] from any other state;
    /// [`SessionError::Transport`] when the handshake fails (the session
    /// lands in Failed).
    pub async fn connect(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock();
            if !state.can_connect() {
                return Err(SessionError::InvalidState {
                    operation: "connect",
                    required: "Disconnected or Failed",
                    actual: *state,
                });
            }
            *state = ConnectionState::Connecting;
        }
        tracing::info!(venue = %self.config.venue, session = %self.session_id, "connecting");
        let _ = self
            .hub
            .send_connection(ConnectionEvent::state(ConnectionState::Connecting));

        match self.commands.handshake().await {
            Ok(()) => {
                self.ensure_runtime();
                *self.state.lock() = ConnectionState::Connected;
                tracing::info!(venue = %self.config.venue, "connected");
                let _ = self
                    .hub
                    .send_connection(ConnectionEvent::state(ConnectionState::Connected));
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = ConnectionState::Failed;
                tracing::error!(venue = %self.config.venue, error = %e, "handshake failed");
                let _ = self.hub.send_connection(ConnectionEvent::failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Close the session gracefully.
    ///
    /// Streams are closed; subscription key sets survive when
    /// `retain_subscriptions` is configured, so a later `connect` resumes
    /// them.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless Connected or Connecting.
    pub fn disconnect(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock();
            if !matches!(
                *state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                return Err(SessionError::InvalidState {
                    operation: "disconnect",
                    required: "Connected or Connecting",
                    actual: *state,
                });
            }
            *state = ConnectionState::Disconnecting;
        }
        let _ = self
            .hub
            .send_connection(ConnectionEvent::state(ConnectionState::Disconnecting));

        if let Some(runtime) = self.runtime.lock().as_ref() {
            for mux in runtime.muxers.values() {
                if self.config.retain_subscriptions {
                    mux.suspend();
                } else {
                    mux.stop();
                }
            }
        }

        *self.state.lock() = ConnectionState::Disconnected;
        tracing::info!(venue = %self.config.venue, "disconnected");
        let _ = self
            .hub
            .send_connection(ConnectionEvent::state(ConnectionState::Disconnected));
        Ok(())
    }

    /// Hard recovery: tear down every owned resource and return to
    /// Disconnected.
    ///
    /// Valid from any state, idempotent, never fails. In-flight errors are
    /// ignored; all pending transactions are invalidated, so callers must
    /// treat unresolved transactions after a reset as unknown.
    pub fn reset(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.cancel.cancel();
        }
        self.correlator.clear();
        metrics::set_pending_transactions(0);

        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = ConnectionState::Disconnected;
            previous
        };

        if previous != ConnectionState::Disconnected {
            tracing::info!(venue = %self.config.venue, from = %previous, "session reset");
            let _ = self
                .hub
                .send_connection(ConnectionEvent::state(ConnectionState::Disconnected));
        }
    }

    /// Create (or resume) the stream workers and the dispatch task.
    fn ensure_runtime(&self) {
        let mut runtime = self.runtime.lock();
        if let Some(runtime) = runtime.as_ref() {
            for mux in runtime.muxers.values() {
                mux.resume();
            }
            return;
        }

        let cancel = self.cancel.child_token();
        let (events_tx, events_rx) =
            mpsc::channel::<StreamEvent>(self.config.channels.inbound_capacity);

        tokio::spawn(run_dispatch(
            events_rx,
            Arc::clone(&self.translator),
            Arc::clone(&self.correlator),
            Arc::clone(&self.hub),
            cancel.clone(),
        ));

        let mux_config = self.config.stream.to_mux_config();
        let muxers = SubscriptionKind::all()
            .iter()
            .map(|&kind| {
                (
                    kind,
                    StreamMultiplexer::spawn(
                        kind,
                        mux_config.clone(),
                        Arc::clone(&self.connector),
                        events_tx.clone(),
                        cancel.child_token(),
                    ),
                )
            })
            .collect();

        *runtime = Some(SessionRuntime { cancel, muxers });
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe a key on the multiplexer owning `kind`.
    ///
    /// Returns false when the key was already subscribed.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless Connected.
    pub fn subscribe(&self, kind: SubscriptionKind, symbol: &str) -> Result<bool, SessionError> {
        self.require_connected("subscribe")?;
        let added = self.with_mux(kind, |mux| {
            let added = mux.add(symbol);
            metrics::set_subscription_count(kind, mux.keys().len());
            added
        })?;
        Ok(added)
    }

    /// Remove a key from the multiplexer owning `kind`.
    ///
    /// Returns false when the key was not subscribed.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless Connected.
    pub fn unsubscribe(&self, kind: SubscriptionKind, symbol: &str) -> Result<bool, SessionError> {
        self.require_connected("unsubscribe")?;
        let removed = self.with_mux(kind, |mux| {
            let removed = mux.remove(symbol);
            metrics::set_subscription_count(kind, mux.keys().len());
            removed
        })?;
        Ok(removed)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Register a new order with the venue.
    ///
    /// Allocates a transaction id, encodes and signs the command, sends it,
    /// and binds the venue's request id to the transaction. A rejection is
    /// published as a terminal order event tied to the returned id.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless Connected; translation,
    /// transport and correlation errors otherwise.
    pub async fn register_order(&self, intent: &OrderIntent) -> Result<TransactionId, SessionError> {
        self.require_connected("register_order")?;

        let transaction_id = self.correlator.create_transaction_id();
        metrics::set_pending_transactions(self.correlator.len());

        let payload = match self.translator.encode_register(transaction_id, intent) {
            Ok(payload) => payload,
            Err(e) => {
                self.correlator.remove_local(transaction_id);
                return Err(e.into());
            }
        };
        let request = self.signer.sign(&payload);

        match self.commands.send(request).await {
            Ok(ack) => {
                // Resolve before anyone can observe the ack downstream
                self.correlator.resolve(transaction_id, &ack.request_id)?;
                metrics::record_command("ok");
                tracing::debug!(
                    transaction = transaction_id,
                    external = %ack.request_id,
                    symbol = %intent.symbol,
                    "order registered"
                );
                Ok(transaction_id)
            }
            Err(e) => {
                self.correlator.remove_local(transaction_id);
                metrics::set_pending_transactions(self.correlator.len());
                metrics::record_command("rejected");
                tracing::warn!(transaction = transaction_id, error = %e, "order rejected");
                let _ = self
                    .hub
                    .send_order(OrderEvent::rejected(transaction_id, e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Send a raw command (lookups, venue-specific calls), correlated with
    /// a fresh transaction id.
    ///
    /// The venue's request id is bound to the returned transaction before
    /// this method returns; a rejection is published as a terminal error
    /// tied to it.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless Connected; transport and
    /// correlation errors otherwise.
    pub async fn send_command(
        &self,
        payload: CommandPayload,
    ) -> Result<TransactionId, SessionError> {
        self.require_connected("send_command")?;

        let transaction_id = self.correlator.create_transaction_id();
        metrics::set_pending_transactions(self.correlator.len());
        let request = self.signer.sign(&payload);

        match self.commands.send(request).await {
            Ok(ack) => {
                self.correlator.resolve(transaction_id, &ack.request_id)?;
                metrics::record_command("ok");
                Ok(transaction_id)
            }
            Err(e) => {
                self.correlator.remove_local(transaction_id);
                metrics::set_pending_transactions(self.correlator.len());
                metrics::record_command("rejected");
                tracing::warn!(transaction = transaction_id, error = %e, "command rejected");
                let _ = self.hub.send_error(ErrorEvent {
                    kind: None,
                    message: e.to_string(),
                    transaction_id: Some(transaction_id),
                });
                Err(e.into())
            }
        }
    }

    /// Cancel a previously registered order.
    ///
    /// Fails fast, before any network call, when the transaction was
    /// never registered or never acknowledged.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless Connected;
    /// [`SessionError::UnknownTransaction`] when no venue order id is bound
    /// to `transaction_id`.
    pub async fn cancel_order(&self, transaction_id: TransactionId) -> Result<(), SessionError> {
        self.require_connected("cancel_order")?;

        let Some(external_id) = self.correlator.external_id(transaction_id) else {
            return Err(SessionError::UnknownTransaction(transaction_id));
        };

        let payload = self.translator.encode_cancel(transaction_id, &external_id)?;
        let request = self.signer.sign(&payload);

        match self.commands.send(request).await {
            Ok(_ack) => {
                metrics::record_command("ok");
                tracing::debug!(transaction = transaction_id, external = %external_id, "cancel sent");
                Ok(())
            }
            Err(e) => {
                metrics::record_command("rejected");
                tracing::warn!(transaction = transaction_id, error = %e, "cancel rejected");
                let _ = self.hub.send_error(ErrorEvent {
                    kind: None,
                    message: e.to_string(),
                    transaction_id: Some(transaction_id),
                });
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_connected(&self, operation: &'static str) -> Result<(), SessionError> {
        let state = *self.state.lock();
        if state.is_connected() {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                required: "Connected",
                actual: state,
            })
        }
    }

    fn with_mux<T>(
        &self,
        kind: SubscriptionKind,
        f: impl FnOnce(&StreamMultiplexer) -> T,
    ) -> Result<T, SessionError> {
        let runtime = self.runtime.lock();
        runtime
            .as_ref()
            .and_then(|rt| rt.muxers.get(&kind))
            .map(|mux| f(mux))
            .ok_or(SessionError::InvalidState {
                operation: "subscribe",
                required: "Connected",
                actual: ConnectionState::Disconnected,
            })
    }
}

impl Drop for AdapterSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for AdapterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSession")
            .field("venue", &self.config.venue)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("pending", &self.correlator.len())
            .finish()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Drain the shared frame queue: translate, correlate, publish.
async fn run_dispatch(
    mut events: mpsc::Receiver<StreamEvent>,
    translator: Arc<dyn MessageTranslator>,
    correlator: Arc<TransactionCorrelator>,
    hub: Arc<MessageHub>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                handle_stream_event(event, translator.as_ref(), &correlator, &hub);
            }
        }
    }
    tracing::debug!("dispatch loop exited");
}

fn handle_stream_event(
    event: StreamEvent,
    translator: &dyn MessageTranslator,
    correlator: &TransactionCorrelator,
    hub: &MessageHub,
) {
    match event {
        StreamEvent::Online { kind, epoch } => {
            tracing::info!(%kind, epoch, "stream online");
        }
        StreamEvent::Offline { kind } => {
            tracing::info!(%kind, "stream offline");
        }
        StreamEvent::Fatal { kind, error } => {
            let _ = hub.send_error(ErrorEvent {
                kind: Some(kind),
                message: error,
                transaction_id: None,
            });
        }
        StreamEvent::Frame { kind, frame } => match translator.translate(kind, &frame) {
            Ok(messages) => {
                for message in messages {
                    publish(message, correlator, hub);
                }
            }
            Err(e) => {
                // One bad message must not take down the stream: log the
                // raw payload and drop the frame
                metrics::record_frame_dropped(kind);
                tracing::warn!(
                    %kind,
                    error = %e,
                    payload = %frame.preview(),
                    "dropping untranslatable frame"
                );
            }
        },
    }
}

fn publish(message: NormalizedMessage, correlator: &TransactionCorrelator, hub: &MessageHub) {
    match message {
        NormalizedMessage::Order(mut event) => {
            correlate_order(&mut event, correlator);
            let _ = hub.send_order(event);
        }
        NormalizedMessage::Book(event) => {
            let _ = hub.send_book(event);
        }
        NormalizedMessage::Trade(event) => {
            let _ = hub.send_trade(event);
        }
        NormalizedMessage::Balance(event) => {
            let _ = hub.send_balance(event);
        }
        NormalizedMessage::Connection(event) => {
            let _ = hub.send_connection(event);
        }
        NormalizedMessage::Error(event) => {
            let _ = hub.send_error(event);
        }
    }
}

/// Attach correlation to an order event, strictly before it is published.
fn correlate_order(event: &mut OrderEvent, correlator: &TransactionCorrelator) {
    match (event.transaction_id, event.external_order_id.as_deref()) {
        (Some(local), Some(external)) => {
            if let Err(e) = correlator.resolve(local, external) {
                tracing::warn!(transaction = local, external, error = %e, "correlation conflict");
            }
        }
        (None, Some(external)) => {
            event.transaction_id = correlator.local_id(external);
        }
        _ => {}
    }

    if event.state.is_terminal()
        && let Some(local) = event.transaction_id
    {
        correlator.remove_local(local);
        metrics::set_pending_transactions(correlator.len());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::application::ports::{
        CommandAck, InboundStream, RawFrame, SignedRequest,
    };
    use crate::domain::message::Side;
    use crate::infrastructure::auth::Credentials;
    use crate::infrastructure::translate::WireTranslator;

    use super::*;

    struct IdleStream;

    #[async_trait]
    impl InboundStream for IdleStream {
        async fn next_frame(&mut self) -> Result<Option<RawFrame>, TransportError> {
            std::future::pending::<()>().await;
            unreachable!()
        }

        async fn close(&mut self) {}
    }

    struct IdleConnector;

    #[async_trait]
    impl StreamConnector for IdleConnector {
        async fn connect(
            &self,
            _kind: SubscriptionKind,
            _symbols: &[Symbol],
        ) -> Result<Box<dyn InboundStream>, TransportError> {
            Ok(Box::new(IdleStream))
        }
    }

    struct ScriptedCommands {
        handshake_ok: bool,
        sent: Mutex<Vec<SignedRequest>>,
    }

    impl ScriptedCommands {
        fn new(handshake_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                handshake_ok,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl CommandClient for ScriptedCommands {
        async fn handshake(&self) -> Result<(), TransportError> {
            if self.handshake_ok {
                Ok(())
            } else {
                Err(TransportError::ConnectFailed("refused".to_string()))
            }
        }

        async fn send(&self, request: SignedRequest) -> Result<CommandAck, TransportError> {
            let n = {
                let mut sent = self.sent.lock();
                sent.push(request);
                sent.len()
            };
            Ok(CommandAck {
                request_id: format!("ext-{n}"),
            })
        }
    }

    fn session(commands: Arc<ScriptedCommands>) -> AdapterSession {
        let config = AdapterConfig::new(
            Credentials::new("key", "secret").unwrap(),
            "ws://venue.test/stream",
            "http://venue.test/api",
        );
        AdapterSession::new(
            config,
            Arc::new(IdleConnector),
            commands,
            Arc::new(WireTranslator::default()),
        )
    }

    #[tokio::test]
    async fn connect_twice_is_a_precondition_error() {
        let s = session(ScriptedCommands::new(true));
        s.connect().await.unwrap();

        let err = s.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                operation: "connect",
                ..
            }
        ));
        assert_eq!(s.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn failed_handshake_lands_in_failed_and_can_retry() {
        let s = session(ScriptedCommands::new(false));

        let err = s.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(s.state(), ConnectionState::Failed);

        // Failed is a valid start state for another connect
        let err = s.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[tokio::test]
    async fn transactional_calls_require_connected() {
        let s = session(ScriptedCommands::new(true));

        assert!(matches!(
            s.subscribe(SubscriptionKind::Ticker, "BTC-USD"),
            Err(SessionError::InvalidState { .. })
        ));

        let intent = OrderIntent {
            symbol: "BTC-USD".to_string(),
            side: Side::Buy,
            price: rust_decimal::Decimal::new(42_000, 0),
            volume: rust_decimal::Decimal::new(1, 2),
        };
        assert!(matches!(
            s.register_order(&intent).await,
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            s.cancel_order(1).await,
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_of_unknown_transaction_never_reaches_the_wire() {
        let commands = ScriptedCommands::new(true);
        let s = session(Arc::clone(&commands));
        s.connect().await.unwrap();

        let err = s.cancel_order(77).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownTransaction(77)));
        assert_eq!(commands.sent_count(), 0);
    }

    #[tokio::test]
    async fn register_binds_the_ack_id() {
        let commands = ScriptedCommands::new(true);
        let s = session(Arc::clone(&commands));
        s.connect().await.unwrap();

        let intent = OrderIntent {
            symbol: "BTC-USD".to_string(),
            side: Side::Sell,
            price: rust_decimal::Decimal::new(42_000, 0),
            volume: rust_decimal::Decimal::new(5, 1),
        };
        let txn = s.register_order(&intent).await.unwrap();

        assert_eq!(s.external_order_id(txn).as_deref(), Some("ext-1"));
        assert_eq!(s.pending_transactions(), 1);
        assert_eq!(commands.sent_count(), 1);

        // Cancel can now go out
        s.cancel_order(txn).await.unwrap();
        assert_eq!(commands.sent_count(), 2);
    }

    #[tokio::test]
    async fn send_command_correlates_a_lookup() {
        let commands = ScriptedCommands::new(true);
        let s = session(Arc::clone(&commands));
        s.connect().await.unwrap();

        let payload = CommandPayload {
            method: crate::application::ports::CommandMethod::Get,
            path: "/v1/orders".to_string(),
            body: String::new(),
        };
        let txn = s.send_command(payload).await.unwrap();

        assert_eq!(s.external_order_id(txn).as_deref(), Some("ext-1"));
        assert_eq!(commands.sent_count(), 1);
    }

    #[tokio::test]
    async fn reset_is_idempotent_from_any_state() {
        let s = session(ScriptedCommands::new(true));

        // Reset while already Disconnected
        s.reset();
        assert_eq!(s.state(), ConnectionState::Disconnected);

        s.connect().await.unwrap();
        s.subscribe(SubscriptionKind::Ticker, "BTC-USD").unwrap();
        let _ = s.correlator.create_transaction_id();

        s.reset();
        assert_eq!(s.state(), ConnectionState::Disconnected);
        assert_eq!(s.pending_transactions(), 0);
        assert!(s.subscribed(SubscriptionKind::Ticker).is_empty());

        s.reset();
        assert_eq!(s.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_requires_an_active_session() {
        let s = session(ScriptedCommands::new(true));
        assert!(matches!(
            s.disconnect(),
            Err(SessionError::InvalidState { .. })
        ));
    }
}

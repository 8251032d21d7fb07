#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Adapter Core - Exchange Message-Adapter Machinery
//!
//! The generic core every venue connector reuses: it manages a connection
//! lifecycle, multiplexes many logical subscriptions onto single physical
//! streaming connections, correlates fire-and-forget outbound requests with
//! their asynchronous acknowledgments, and translates vendor wire shapes
//! into one normalized trading-message protocol. Venue connectors supply a
//! translator (and, where the provided WebSocket/HTTP transports do not
//! fit, their own transports); everything else is shared.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Normalized message protocol and subscription bookkeeping
//!   - `message`: orders, books, trades, balances, connection states
//!   - `subscription`: epoch-tagged desired key sets
//!
//! - **Application**: Port definitions
//!   - `ports`: stream/command transports and the translation contract
//!
//! - **Infrastructure**: Adapters and session machinery
//!   - `session`: connection lifecycle controller and dispatch
//!   - `stream`: epoch-guarded subscription multiplexers, WebSocket
//!     transport, retry and heartbeat
//!   - `correlation`: transaction-id store
//!   - `auth`: HMAC request signing
//!   - `translate`: translation helpers and the reference wire dialect
//!   - `http`: command client
//!   - `broadcast`: normalized-message fan-out
//!   - `config`, `telemetry`, `metrics`: ambient concerns
//!
//! # Data Flow
//!
//! ```text
//! venue WS (ticker) ──┐
//! venue WS (book)   ──┤   ┌──────────────┐    ┌─────────────┐
//! venue WS (trades) ──┼──►│   Dispatch   │───►│  MessageHub │──► consumers
//! venue WS (orders) ──┤   │ (translate + │    │ (broadcast  │
//! venue WS (balance)──┘   │  correlate)  │    │  channels)  │
//!                         └──────────────┘    └─────────────┘
//!        ▲                       ▲
//!        │ subscribe/reconcile   │ resolve / remove
//! ┌──────┴───────┐        ┌──────┴──────────┐       signed commands
//! │ Multiplexers │        │   Correlator    │◄──── AdapterSession ───► venue HTTP
//! └──────────────┘        └─────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Normalized messages and subscription bookkeeping.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and session machinery.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::message::{
    BalanceEvent, BookEvent, BookLevel, ConnectionEvent, ConnectionState, ErrorEvent, EventTime,
    NormalizedMessage, OrderEvent, OrderIntent, OrderState, Side, Symbol, TradeEvent,
    TransactionId,
};
pub use domain::subscription::{DesiredKeys, StreamEpoch, SubscriptionKind};

// Ports
pub use application::ports::{
    CommandAck, CommandClient, CommandMethod, CommandPayload, FramePayload, InboundStream,
    MessageTranslator, RawFrame, SignedRequest, StreamConnector, TranslateError, TransportError,
};

// Session
pub use infrastructure::session::{AdapterSession, SessionError};

// Streams
pub use infrastructure::stream::{
    HeartbeatConfig, MuxConfig, RetryConfig, RetryPolicy, StreamEvent, StreamMultiplexer,
    StreamPhase, WsConnectorConfig, WsStreamConnector,
};

// Correlation
pub use infrastructure::correlation::{
    CorrelationError, PendingTransaction, TransactionCorrelator,
};

// Auth
pub use infrastructure::auth::{AuthError, Credentials, NonceSequence, RequestSigner, SignatureEncoding};

// Translation
pub use infrastructure::translate::{SideTable, TimeUnit, WireDialect, WireTranslator};

// Broadcast hub
pub use infrastructure::broadcast::{HubConfig, HubStats, MessageHub};

// HTTP command client
pub use infrastructure::http::{HttpClientConfig, HttpCommandClient};

// Configuration
pub use infrastructure::config::{
    AdapterConfig, ChannelSettings, CommandSettings, ConfigError, StreamSettings, load_dotenv,
};

// Metrics
pub use infrastructure::metrics::{get_metrics_handle, init_metrics};

//! Port Interfaces
//!
//! Contracts between the adapter core and venue-facing infrastructure,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`StreamConnector`] / [`InboundStream`]: one physical streaming
//!   connection per subscription kind, with the desired key set encoded in
//!   the connect request
//! - [`CommandClient`]: signed command/lookup calls (register order, cancel
//!   order) plus the connect-time handshake probe
//!
//! ## Translation Contract
//!
//! - [`MessageTranslator`]: pure conversion between raw vendor frames and
//!   normalized messages, and between outbound intents and vendor command
//!   payloads
//!
//! Implementations for WebSocket streams and HTTP commands live in the
//! infrastructure layer; tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::message::{NormalizedMessage, OrderIntent, Symbol, TransactionId};
use crate::domain::subscription::SubscriptionKind;

// =============================================================================
// Raw Frames
// =============================================================================

/// Payload of one framed message from a physical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// Text frame (JSON dialects).
    Text(String),
    /// Binary frame (MessagePack dialects).
    Binary(Vec<u8>),
}

/// One inbound frame, stamped with its local receipt time.
///
/// The receipt time is the fallback event time when the venue omits its own
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame payload.
    pub payload: FramePayload,
    /// Local receipt time.
    pub received_at: DateTime<Utc>,
}

impl RawFrame {
    /// Build a text frame stamped with the current time.
    #[must_use]
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: FramePayload::Text(payload.into()),
            received_at: Utc::now(),
        }
    }

    /// Build a binary frame stamped with the current time.
    #[must_use]
    pub fn binary(payload: Vec<u8>) -> Self {
        Self {
            payload: FramePayload::Binary(payload),
            received_at: Utc::now(),
        }
    }

    /// A short, log-safe preview of the payload.
    ///
    /// Used when a frame fails translation: the raw payload is logged so the
    /// offending message can be diagnosed without taking down the stream.
    #[must_use]
    pub fn preview(&self) -> String {
        const MAX: usize = 256;
        match &self.payload {
            FramePayload::Text(text) => {
                let mut end = text.len().min(MAX);
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text[..end].to_string()
            }
            FramePayload::Binary(bytes) => {
                format!("<binary {} bytes: {}>", bytes.len(), hex_prefix(bytes))
            }
        }
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(16)])
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by stream and command transports.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not establish the physical connection.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The stream or request failed mid-flight.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// No data arrived within the configured deadline.
    #[error("transport timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The venue refused the request. Never retried automatically, since
    /// retrying a rejected order could double-submit.
    #[error("request rejected by venue ({status}): {message}")]
    Rejected {
        /// Venue status code.
        status: u16,
        /// Venue-supplied detail.
        message: String,
    },
}

// =============================================================================
// Streaming Ports
// =============================================================================

/// An open physical stream delivering raw frames.
#[async_trait]
pub trait InboundStream: Send {
    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on orderly end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on read failure or timeout.
    async fn next_frame(&mut self) -> Result<Option<RawFrame>, TransportError>;

    /// Close the stream, releasing the underlying connection.
    async fn close(&mut self);
}

/// Opens physical streaming connections.
///
/// The desired key set is encoded in the connect request; changing the set
/// means opening a replacement connection (the epoch check in the
/// multiplexer discards attempts whose captured set went stale).
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a stream for `kind` subscribed to `symbols`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the connection cannot be
    /// established or the subscribe request fails.
    async fn connect(
        &self,
        kind: SubscriptionKind,
        symbols: &[Symbol],
    ) -> Result<Box<dyn InboundStream>, TransportError>;
}

// =============================================================================
// Command Ports
// =============================================================================

/// HTTP-style method of a command request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMethod {
    /// Read-only lookup.
    Get,
    /// State-changing command.
    Post,
    /// Resource removal.
    Delete,
}

impl CommandMethod {
    /// Canonical method name (used in signing and request building).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// An unsigned command produced by a translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPayload {
    /// Request method.
    pub method: CommandMethod,
    /// Venue path (e.g. `/v1/orders`).
    pub path: String,
    /// Serialized request body, empty for bodyless requests.
    pub body: String,
}

/// A command with authentication headers attached, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Request method.
    pub method: CommandMethod,
    /// Venue path.
    pub path: String,
    /// Serialized request body.
    pub body: String,
    /// Authentication headers (key, timestamp, nonce, signature).
    pub headers: Vec<(String, String)>,
}

/// Venue acknowledgment of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    /// Venue-assigned request/order identifier.
    pub request_id: String,
}

/// Sends signed commands to the venue.
#[async_trait]
pub trait CommandClient: Send + Sync {
    /// Probe the venue at connect time.
    ///
    /// Stateless HTTP-only venues accept the default no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the venue is unreachable.
    async fn handshake(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Send one signed command and return the venue acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] when the venue refuses the
    /// request, or another [`TransportError`] on I/O failure.
    async fn send(&self, request: SignedRequest) -> Result<CommandAck, TransportError>;
}

// =============================================================================
// Translation Contract
// =============================================================================

/// Errors raised while translating between vendor and normalized shapes.
///
/// A translation error drops the single offending frame; the stream keeps
/// running. One bad message must not take down a healthy connection.
#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    /// The frame discriminator is not part of the dialect.
    #[error("unknown frame type: {discriminator}")]
    UnknownFrame {
        /// Discriminator value found on the wire.
        discriminator: String,
    },

    /// A side/direction code with no entry in the side table.
    #[error("unmapped side code: {code}")]
    UnmappedSide {
        /// Vendor side code.
        code: String,
    },

    /// A required field is absent.
    #[error("missing field `{field}`")]
    MissingField {
        /// Field name.
        field: &'static str,
    },

    /// A field is present but unparseable.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Parse failure detail.
        reason: String,
    },

    /// A numeric value that is neither a number nor a decimal string.
    #[error("invalid numeric value: {value}")]
    InvalidNumber {
        /// Offending value rendered for logs.
        value: String,
    },

    /// The frame is not well-formed for the dialect's encoding.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Pure translation between vendor wire shapes and normalized messages.
///
/// Implementations must be stateless (or internally synchronized): the
/// session calls them concurrently from the dispatch loop and the command
/// path.
pub trait MessageTranslator: Send + Sync {
    /// Translate one inbound frame into zero or more normalized messages.
    ///
    /// Control frames (acks, keepalives) translate to an empty vector.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslateError`] describing the offending field; the
    /// caller logs it with the raw payload and drops the frame.
    fn translate(
        &self,
        kind: SubscriptionKind,
        frame: &RawFrame,
    ) -> Result<Vec<NormalizedMessage>, TranslateError>;

    /// Encode an order-registration command.
    ///
    /// The local transaction id is embedded as the client tag so venue
    /// acknowledgments can be correlated back.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslateError`] when the intent cannot be expressed in
    /// the dialect.
    fn encode_register(
        &self,
        transaction_id: TransactionId,
        intent: &OrderIntent,
    ) -> Result<CommandPayload, TranslateError>;

    /// Encode an order-cancel command for a known venue order id.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslateError`] when the cancel cannot be expressed in
    /// the dialect.
    fn encode_cancel(
        &self,
        transaction_id: TransactionId,
        external_order_id: &str,
    ) -> Result<CommandPayload, TranslateError>;
}

// =============================================================================
// Tests
// =============================================================================

//! Normalized Trading Messages
//!
//! Venue-neutral message types emitted by the adapter core. Every inbound
//! vendor event is translated into one of these before it reaches
//! strategy/storage/UI consumers; consumers never see vendor wire shapes.
//!
//! All prices and volumes are fixed-point decimals. Absent numeric fields
//! stay `None` ("unknown") rather than defaulting to zero, so downstream
//! aggregation cannot be silently corrupted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Locally allocated transaction identifier.
///
/// Allocated by the transaction correlator before a command is sent; the
/// venue-assigned identifier is attached asynchronously once the venue
/// acknowledges the request.
pub type TransactionId = i64;

/// An instrument/channel symbol (e.g. "BTC-USD").
pub type Symbol = String;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of an adapter session.
///
/// Exactly one session owns one state value; transitions are serialized by
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session resources are live.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session is usable; transactional operations are accepted.
    Connected,
    /// Graceful teardown in progress.
    Disconnecting,
    /// Handshake or session failed; requires `connect()` or `reset()`.
    Failed,
}

impl ConnectionState {
    /// Check whether transactional operations are accepted in this state.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check whether `connect()` is a valid operation from this state.
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// Name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event Timestamps
// =============================================================================

/// A UTC timestamp with provenance.
///
/// When a venue omits or garbles the event time, the adapter substitutes the
/// local receipt time and flags the substitution so consumers can tell the
/// two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTime {
    /// The event time in UTC.
    pub timestamp: DateTime<Utc>,
    /// True when the venue time was missing and the local receipt time was
    /// substituted.
    pub substituted: bool,
}

impl EventTime {
    /// A venue-reported timestamp.
    #[must_use]
    pub const fn venue(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            substituted: false,
        }
    }

    /// A locally substituted timestamp (venue time unavailable).
    #[must_use]
    pub const fn substituted(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            substituted: true,
        }
    }

    /// The current local time, flagged as substituted.
    #[must_use]
    pub fn local_now() -> Self {
        Self::substituted(Utc::now())
    }
}

// =============================================================================
// Sides and Order States
// =============================================================================

/// Trade/order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buying side.
    Buy,
    /// Selling side.
    Sell,
}

impl Side {
    /// Name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Lifecycle state of an order as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    /// Resting on the book.
    Active,
    /// Partially executed, remainder still working.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Cancelled by the caller or the venue.
    Cancelled,
    /// Refused by the venue.
    Rejected,
    /// Expired per its time-in-force.
    Expired,
}

impl OrderState {
    /// Check whether this state ends the order's lifecycle.
    ///
    /// Terminal states release the pending-transaction entry in the
    /// correlator; keeping it would leak memory for the life of the session.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }
}

// =============================================================================
// Outbound Intents
// =============================================================================

/// A request to register a new order with the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Instrument to trade.
    pub symbol: Symbol,
    /// Direction.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Requested volume.
    pub volume: Decimal,
}

// =============================================================================
// Normalized Events
// =============================================================================

/// Session connection-state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// New session state.
    pub state: ConnectionState,
    /// Error detail when the transition was caused by a failure.
    pub error: Option<String>,
}

impl ConnectionEvent {
    /// A plain state change.
    #[must_use]
    pub const fn state(state: ConnectionState) -> Self {
        Self { state, error: None }
    }

    /// A failure transition with detail.
    #[must_use]
    pub const fn failed(error: String) -> Self {
        Self {
            state: ConnectionState::Failed,
            error: Some(error),
        }
    }
}

/// Order lifecycle change tied back to the originating transaction where
/// known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Local transaction id, when the event could be correlated.
    pub transaction_id: Option<TransactionId>,
    /// Venue-assigned order id, once known.
    pub external_order_id: Option<String>,
    /// Reported order state.
    pub state: OrderState,
    /// Executed volume so far.
    pub filled_volume: Option<Decimal>,
    /// Volume still working.
    pub remaining_volume: Option<Decimal>,
    /// Order or execution price.
    pub price: Option<Decimal>,
    /// Venue-supplied detail (rejection reason etc.).
    pub reason: Option<String>,
    /// Event time.
    pub server_time: EventTime,
}

impl OrderEvent {
    /// A rejection event for a command the venue refused.
    #[must_use]
    pub fn rejected(transaction_id: TransactionId, reason: String) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            external_order_id: None,
            state: OrderState::Rejected,
            filled_volume: None,
            remaining_volume: None,
            price: None,
            reason: Some(reason),
            server_time: EventTime::local_now(),
        }
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting volume at the level; `None` when the venue did not report it.
    pub volume: Option<Decimal>,
}

/// Quote/book change for one instrument.
///
/// Top-of-book ticker updates and full depth snapshots both arrive through
/// this type; a ticker is simply a one-level book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEvent {
    /// Instrument.
    pub symbol: Symbol,
    /// Bid levels, best first.
    pub bids: Vec<BookLevel>,
    /// Ask levels, best first.
    pub asks: Vec<BookLevel>,
    /// Event time.
    pub server_time: EventTime,
}

/// A public trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Instrument.
    pub symbol: Symbol,
    /// Execution price.
    pub price: Decimal,
    /// Executed volume.
    pub volume: Decimal,
    /// Aggressor side.
    pub side: Side,
    /// Event time.
    pub server_time: EventTime,
}

/// Account balance change for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEvent {
    /// Asset/currency code.
    pub asset: String,
    /// Freely available amount.
    pub available: Option<Decimal>,
    /// Amount reserved by working orders.
    pub reserved: Option<Decimal>,
    /// Event time.
    pub server_time: EventTime,
}

/// A terminal error surfaced to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Stream the error originated from, when stream-scoped.
    pub kind: Option<crate::domain::subscription::SubscriptionKind>,
    /// Human-readable detail.
    pub message: String,
    /// Originating transaction, when the error is tied to a command.
    pub transaction_id: Option<TransactionId>,
}

/// Any normalized message produced by a translator.
///
/// The session dispatch loop fans these out onto the per-kind broadcast
/// channels of the message hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedMessage {
    /// Connection-state change.
    Connection(ConnectionEvent),
    /// Order lifecycle change.
    Order(OrderEvent),
    /// Quote/book change.
    Book(BookEvent),
    /// Trade print.
    Trade(TradeEvent),
    /// Balance change.
    Balance(BalanceEvent),
    /// Venue-reported error.
    Error(ErrorEvent),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_guards() {
        assert!(ConnectionState::Disconnected.can_connect());
        assert!(ConnectionState::Failed.can_connect());
        assert!(!ConnectionState::Connected.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());

        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnecting.is_connected());
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }

    #[test]
    fn order_state_terminality() {
        assert!(OrderState::Filled.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
        assert!(OrderState::Rejected.is_terminal());
        assert!(OrderState::Expired.is_terminal());
        assert!(!OrderState::Active.is_terminal());
        assert!(!OrderState::PartiallyFilled.is_terminal());
    }

    #[test]
    fn event_time_provenance() {
        let venue = EventTime::venue(Utc::now());
        assert!(!venue.substituted);

        let local = EventTime::local_now();
        assert!(local.substituted);
    }

    #[test]
    fn rejected_order_event_is_terminal() {
        let ev = OrderEvent::rejected(42, "insufficient funds".to_string());
        assert_eq!(ev.transaction_id, Some(42));
        assert!(ev.state.is_terminal());
        assert!(ev.filled_volume.is_none());
        assert!(ev.server_time.substituted);
    }

    #[test]
    fn connection_event_constructors() {
        let ok = ConnectionEvent::state(ConnectionState::Connected);
        assert!(ok.error.is_none());

        let bad = ConnectionEvent::failed("refused".to_string());
        assert_eq!(bad.state, ConnectionState::Failed);
        assert_eq!(bad.error.as_deref(), Some("refused"));
    }
}

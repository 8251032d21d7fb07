//! Message Hub
//!
//! Fan-out of normalized messages to consumers over tokio broadcast
//! channels, one per message type. This replaces per-callback wiring with
//! ordered, inspectable queues: a consumer subscribes to the types it cares
//! about and receives every message published after it subscribed.
//!
//! Within one channel, messages are delivered in publication order, which
//! preserves the per-stream arrival order guaranteed by the dispatch loop.

use tokio::sync::broadcast;

use crate::domain::message::{
    BalanceEvent, BookEvent, ConnectionEvent, ErrorEvent, OrderEvent, TradeEvent,
};

// =============================================================================
// Configuration
// =============================================================================

/// Capacities of the hub's broadcast channels.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Capacity of the connection-state channel.
    pub connection_capacity: usize,
    /// Capacity of the order-event channel.
    pub orders_capacity: usize,
    /// Capacity of the book-event channel.
    pub books_capacity: usize,
    /// Capacity of the trade-event channel.
    pub trades_capacity: usize,
    /// Capacity of the balance-event channel.
    pub balances_capacity: usize,
    /// Capacity of the error channel.
    pub errors_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connection_capacity: 64,
            orders_capacity: 1_000,
            books_capacity: 10_000,
            trades_capacity: 10_000,
            balances_capacity: 1_000,
            errors_capacity: 256,
        }
    }
}

// =============================================================================
// Hub
// =============================================================================

/// Central hub for all outbound message channels.
///
/// # Example
///
/// ```rust
/// use adapter_core::infrastructure::broadcast::{HubConfig, MessageHub};
///
/// let hub = MessageHub::new(HubConfig::default());
/// let mut books = hub.books_rx();
/// // publish from another task: hub.send_book(event);
/// ```
#[derive(Debug)]
pub struct MessageHub {
    connection_tx: broadcast::Sender<ConnectionEvent>,
    orders_tx: broadcast::Sender<OrderEvent>,
    books_tx: broadcast::Sender<BookEvent>,
    trades_tx: broadcast::Sender<TradeEvent>,
    balances_tx: broadcast::Sender<BalanceEvent>,
    errors_tx: broadcast::Sender<ErrorEvent>,
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl MessageHub {
    /// Create a hub with the given capacities.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            connection_tx: broadcast::channel(config.connection_capacity).0,
            orders_tx: broadcast::channel(config.orders_capacity).0,
            books_tx: broadcast::channel(config.books_capacity).0,
            trades_tx: broadcast::channel(config.trades_capacity).0,
            balances_tx: broadcast::channel(config.balances_capacity).0,
            errors_tx: broadcast::channel(config.errors_capacity).0,
        }
    }

    /// Publish a connection-state change.
    ///
    /// Returns the number of receivers, or `None` when nobody listens.
    pub fn send_connection(&self, event: ConnectionEvent) -> Option<usize> {
        self.connection_tx.send(event).ok()
    }

    /// Subscribe to connection-state changes.
    #[must_use]
    pub fn connection_rx(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection_tx.subscribe()
    }

    /// Publish an order event.
    pub fn send_order(&self, event: OrderEvent) -> Option<usize> {
        self.orders_tx.send(event).ok()
    }

    /// Subscribe to order events.
    #[must_use]
    pub fn orders_rx(&self) -> broadcast::Receiver<OrderEvent> {
        self.orders_tx.subscribe()
    }

    /// Publish a book event.
    pub fn send_book(&self, event: BookEvent) -> Option<usize> {
        self.books_tx.send(event).ok()
    }

    /// Subscribe to book events.
    #[must_use]
    pub fn books_rx(&self) -> broadcast::Receiver<BookEvent> {
        self.books_tx.subscribe()
    }

    /// Publish a trade print.
    pub fn send_trade(&self, event: TradeEvent) -> Option<usize> {
        self.trades_tx.send(event).ok()
    }

    /// Subscribe to trade prints.
    #[must_use]
    pub fn trades_rx(&self) -> broadcast::Receiver<TradeEvent> {
        self.trades_tx.subscribe()
    }

    /// Publish a balance event.
    pub fn send_balance(&self, event: BalanceEvent) -> Option<usize> {
        self.balances_tx.send(event).ok()
    }

    /// Subscribe to balance events.
    #[must_use]
    pub fn balances_rx(&self) -> broadcast::Receiver<BalanceEvent> {
        self.balances_tx.subscribe()
    }

    /// Publish a terminal error.
    pub fn send_error(&self, event: ErrorEvent) -> Option<usize> {
        self.errors_tx.send(event).ok()
    }

    /// Subscribe to terminal errors.
    #[must_use]
    pub fn errors_rx(&self) -> broadcast::Receiver<ErrorEvent> {
        self.errors_tx.subscribe()
    }

    /// Receiver counts across all channels.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connection_receivers: self.connection_tx.receiver_count(),
            orders_receivers: self.orders_tx.receiver_count(),
            books_receivers: self.books_tx.receiver_count(),
            trades_receivers: self.trades_tx.receiver_count(),
            balances_receivers: self.balances_tx.receiver_count(),
            errors_receivers: self.errors_tx.receiver_count(),
        }
    }
}

/// Receiver counts per channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubStats {
    /// Connection-state channel receivers.
    pub connection_receivers: usize,
    /// Order channel receivers.
    pub orders_receivers: usize,
    /// Book channel receivers.
    pub books_receivers: usize,
    /// Trade channel receivers.
    pub trades_receivers: usize,
    /// Balance channel receivers.
    pub balances_receivers: usize,
    /// Error channel receivers.
    pub errors_receivers: usize,
}

impl HubStats {
    /// Total receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.connection_receivers
            + self.orders_receivers
            + self.books_receivers
            + self.trades_receivers
            + self.balances_receivers
            + self.errors_receivers
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use tokio_test::assert_ok;

    use crate::domain::message::{ConnectionState, EventTime, Side};

    use super::*;

    fn make_trade(symbol: &str) -> TradeEvent {
        TradeEvent {
            symbol: symbol.to_string(),
            price: Decimal::new(42_000, 0),
            volume: Decimal::new(1, 2),
            side: Side::Buy,
            server_time: EventTime::venue(Utc::now()),
        }
    }

    #[test]
    fn send_without_receivers_returns_none() {
        let hub = MessageHub::default();
        assert!(hub.send_trade(make_trade("BTC-USD")).is_none());
    }

    #[tokio::test]
    async fn send_and_receive_trade() {
        let hub = MessageHub::default();
        let mut rx = hub.trades_rx();

        let delivered = hub.send_trade(make_trade("BTC-USD"));
        assert_eq!(delivered, Some(1));

        let trade = assert_ok!(rx.recv().await);
        assert_eq!(trade.symbol, "BTC-USD");
    }

    #[tokio::test]
    async fn multiple_receivers_see_every_message() {
        let hub = MessageHub::default();
        let mut rx1 = hub.connection_rx();
        let mut rx2 = hub.connection_rx();

        let _ = hub.send_connection(ConnectionEvent::state(ConnectionState::Connecting));
        let _ = hub.send_connection(ConnectionEvent::state(ConnectionState::Connected));

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(
                rx.recv().await.expect("event").state,
                ConnectionState::Connecting
            );
            assert_eq!(
                rx.recv().await.expect("event").state,
                ConnectionState::Connected
            );
        }
    }

    #[test]
    fn channels_are_independent() {
        let hub = MessageHub::default();
        let _books = hub.books_rx();
        let _errors = hub.errors_rx();

        let stats = hub.stats();
        assert_eq!(stats.books_receivers, 1);
        assert_eq!(stats.errors_receivers, 1);
        assert_eq!(stats.trades_receivers, 0);
        assert_eq!(stats.total_receivers(), 2);
    }

    #[test]
    fn receiver_count_drops_with_receiver() {
        let hub = MessageHub::default();
        {
            let _rx = hub.orders_rx();
            assert_eq!(hub.stats().orders_receivers, 1);
        }
        assert_eq!(hub.stats().orders_receivers, 0);
    }
}

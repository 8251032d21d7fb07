//! Subscription Tracking
//!
//! Domain types for the desired-subscription set of one stream multiplexer.
//!
//! # Design
//!
//! Each multiplexer owns exactly one [`DesiredKeys`] value: the set of
//! symbols the physical stream *should* be carrying, together with a
//! monotonically increasing epoch. Every mutation bumps the epoch, which
//! lets an in-flight connection attempt detect that the set it captured is
//! stale and must be abandoned. The epoch is the only defense against the
//! "add while reconnecting" race: a subscription added immediately after a
//! connect attempt started must not be silently lost, and a superseded
//! attempt must not overwrite state a newer attempt already set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::message::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Generation counter for a multiplexer's desired key set.
pub type StreamEpoch = u64;

/// Logical channel kind carried by a streaming connection.
///
/// Keys are unique per kind; each kind is owned by exactly one multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Top-of-book quotes.
    Ticker,
    /// Order book depth.
    Book,
    /// Public trade prints.
    Trades,
    /// The caller's own order events.
    UserOrders,
    /// Account balance changes.
    Balances,
}

impl SubscriptionKind {
    /// All kinds, in a stable order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Ticker,
            Self::Book,
            Self::Trades,
            Self::UserOrders,
            Self::Balances,
        ]
    }

    /// Channel name used in wire requests, logs, and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Book => "book",
            Self::Trades => "trades",
            Self::UserOrders => "user_orders",
            Self::Balances => "balances",
        }
    }

    /// Check whether this kind requires an authenticated stream.
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(self, Self::UserOrders | Self::Balances)
    }
}

impl std::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Desired Key Set
// =============================================================================

/// The desired subscription set of one multiplexer, with its epoch.
///
/// Mutations that change the set bump the epoch; `clear` bumps it
/// unconditionally so a stop always invalidates in-flight attempts.
#[derive(Debug, Clone, Default)]
pub struct DesiredKeys {
    keys: BTreeSet<Symbol>,
    epoch: StreamEpoch,
}

impl DesiredKeys {
    /// Create an empty set at epoch zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key. Returns true (and bumps the epoch) when the set changed.
    pub fn insert(&mut self, symbol: impl Into<Symbol>) -> bool {
        let changed = self.keys.insert(symbol.into());
        if changed {
            self.epoch += 1;
        }
        changed
    }

    /// Remove a key. Returns true (and bumps the epoch) when the set changed.
    pub fn remove(&mut self, symbol: &str) -> bool {
        let changed = self.keys.remove(symbol);
        if changed {
            self.epoch += 1;
        }
        changed
    }

    /// Drop all keys. Always bumps the epoch.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.epoch += 1;
    }

    /// Current epoch.
    #[must_use]
    pub const fn epoch(&self) -> StreamEpoch {
        self.epoch
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.keys.contains(symbol)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Snapshot the keys in stable (sorted) order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Symbol> {
        self.keys.iter().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

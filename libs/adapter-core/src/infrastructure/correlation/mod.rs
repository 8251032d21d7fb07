//! Transaction Correlation
//!
//! Maps locally allocated transaction ids to the identifiers venues assign
//! asynchronously, giving the rest of the system synchronous-looking request
//! handles over a fire-and-forget wire protocol.
//!
//! # Invariants
//!
//! - at most one pending entry per local id;
//! - local and external ids are both unique within a session; binding
//!   either to a *different* partner is a [`CorrelationError::DuplicateAssociation`]
//!   programming error, never a silent overwrite (an overwrite would corrupt
//!   downstream reconciliation);
//! - re-binding the *same* pair is an idempotent no-op (venues may echo the
//!   ack on both the command response and the stream);
//! - entries are removed once the transaction reaches a terminal state;
//!   correlation is session-scoped and intentionally not durable.
//!
//! Thread-safety: one coarse lock over both maps, acquired from the command
//! path (create/resolve) and the stream-read path (resolve/remove); the lock
//! is never held across I/O.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::domain::message::TransactionId;

// =============================================================================
// Types
// =============================================================================

/// A command awaiting (or holding) its venue-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Locally allocated id.
    pub local_id: TransactionId,
    /// Venue-assigned id, once the venue acknowledged the request.
    pub external_id: Option<String>,
    /// Allocation time.
    pub created_at: DateTime<Utc>,
}

/// Errors raised by the correlator.
#[derive(Debug, Clone, Error)]
pub enum CorrelationError {
    /// An id is already bound to a different partner.
    #[error(
        "transaction {local_id} or external id {external_id} is already bound to a different pair"
    )]
    DuplicateAssociation {
        /// Local id of the attempted binding.
        local_id: TransactionId,
        /// External id of the attempted binding.
        external_id: String,
    },

    /// The local id was never allocated (or already removed).
    #[error("unknown transaction id {0}")]
    UnknownTransaction(TransactionId),
}

// =============================================================================
// Correlator
// =============================================================================

#[derive(Debug, Default)]
struct Maps {
    next_id: TransactionId,
    by_local: HashMap<TransactionId, PendingTransaction>,
    by_external: HashMap<String, TransactionId>,
}

/// Session-scoped bidirectional transaction-id store.
///
/// # Example
///
/// ```rust
/// use adapter_core::infrastructure::correlation::TransactionCorrelator;
///
/// let correlator = TransactionCorrelator::new();
///
/// let txn = correlator.create_transaction_id();
/// correlator.resolve(txn, "venue-42").unwrap();
///
/// assert_eq!(correlator.external_id(txn).as_deref(), Some("venue-42"));
/// assert_eq!(correlator.local_id("venue-42"), Some(txn));
///
/// // Terminal state: release the entry
/// correlator.remove_local(txn);
/// assert!(correlator.is_empty());
/// ```
#[derive(Debug)]
pub struct TransactionCorrelator {
    maps: Mutex<Maps>,
}

impl Default for TransactionCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionCorrelator {
    /// Create an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(Maps {
                next_id: 1,
                ..Maps::default()
            }),
        }
    }

    /// Allocate a new local transaction id and record the pending entry.
    pub fn create_transaction_id(&self) -> TransactionId {
        let mut maps = self.maps.lock();
        let id = maps.next_id;
        maps.next_id += 1;
        maps.by_local.insert(
            id,
            PendingTransaction {
                local_id: id,
                external_id: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Attach the venue-assigned id to a pending transaction.
    ///
    /// Idempotent for the same pair.
    ///
    /// # Errors
    ///
    /// [`CorrelationError::UnknownTransaction`] when the local id was never
    /// allocated, [`CorrelationError::DuplicateAssociation`] when either id
    /// is already bound to a different partner.
    pub fn resolve(
        &self,
        local_id: TransactionId,
        external_id: &str,
    ) -> Result<(), CorrelationError> {
        let mut maps = self.maps.lock();

        if let Some(&bound_local) = maps.by_external.get(external_id)
            && bound_local != local_id
        {
            return Err(CorrelationError::DuplicateAssociation {
                local_id,
                external_id: external_id.to_string(),
            });
        }

        let Some(pending) = maps.by_local.get_mut(&local_id) else {
            return Err(CorrelationError::UnknownTransaction(local_id));
        };

        match pending.external_id.as_deref() {
            Some(existing) if existing == external_id => Ok(()),
            Some(_) => Err(CorrelationError::DuplicateAssociation {
                local_id,
                external_id: external_id.to_string(),
            }),
            None => {
                pending.external_id = Some(external_id.to_string());
                maps.by_external.insert(external_id.to_string(), local_id);
                Ok(())
            }
        }
    }

    /// Look up the venue-assigned id for a local id.
    #[must_use]
    pub fn external_id(&self, local_id: TransactionId) -> Option<String> {
        self.maps
            .lock()
            .by_local
            .get(&local_id)
            .and_then(|p| p.external_id.clone())
    }

    /// Look up the local id for a venue-assigned id.
    #[must_use]
    pub fn local_id(&self, external_id: &str) -> Option<TransactionId> {
        self.maps.lock().by_external.get(external_id).copied()
    }

    /// Remove a transaction by local id, returning the entry if present.
    pub fn remove_local(&self, local_id: TransactionId) -> Option<PendingTransaction> {
        let mut maps = self.maps.lock();
        let pending = maps.by_local.remove(&local_id)?;
        if let Some(external) = pending.external_id.as_deref() {
            maps.by_external.remove(external);
        }
        Some(pending)
    }

    /// Remove a transaction by venue-assigned id, returning the entry if
    /// present.
    pub fn remove_external(&self, external_id: &str) -> Option<PendingTransaction> {
        let mut maps = self.maps.lock();
        let local = maps.by_external.remove(external_id)?;
        maps.by_local.remove(&local)
    }

    /// Drop every pending entry (session reset).
    pub fn clear(&self) {
        let mut maps = self.maps.lock();
        maps.by_local.clear();
        maps.by_external.clear();
    }

    /// Number of pending transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.lock().by_local.len()
    }

    /// Check whether no transactions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.lock().by_local.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let correlator = TransactionCorrelator::new();
        let a = correlator.create_transaction_id();
        let b = correlator.create_transaction_id();
        assert!(b > a);
        assert_eq!(correlator.len(), 2);
    }

    #[test]
    fn resolve_binds_both_directions() {
        let correlator = TransactionCorrelator::new();
        let txn = correlator.create_transaction_id();

        correlator.resolve(txn, "ext-1").unwrap();

        assert_eq!(correlator.external_id(txn).as_deref(), Some("ext-1"));
        assert_eq!(correlator.local_id("ext-1"), Some(txn));
    }

    #[test]
    fn resolve_same_pair_is_idempotent() {
        let correlator = TransactionCorrelator::new();
        let txn = correlator.create_transaction_id();

        correlator.resolve(txn, "ext-1").unwrap();
        correlator.resolve(txn, "ext-1").unwrap();

        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn rebinding_local_to_new_external_fails() {
        let correlator = TransactionCorrelator::new();
        let txn = correlator.create_transaction_id();

        correlator.resolve(txn, "ext-1").unwrap();
        let err = correlator.resolve(txn, "ext-2").unwrap_err();

        assert!(matches!(err, CorrelationError::DuplicateAssociation { .. }));
        // The original binding is untouched
        assert_eq!(correlator.external_id(txn).as_deref(), Some("ext-1"));
    }

    #[test]
    fn rebinding_external_to_new_local_fails() {
        let correlator = TransactionCorrelator::new();
        let a = correlator.create_transaction_id();
        let b = correlator.create_transaction_id();

        correlator.resolve(a, "ext-1").unwrap();
        let err = correlator.resolve(b, "ext-1").unwrap_err();

        assert!(matches!(err, CorrelationError::DuplicateAssociation { .. }));
        assert_eq!(correlator.local_id("ext-1"), Some(a));
    }

    #[test]
    fn resolve_unknown_local_fails() {
        let correlator = TransactionCorrelator::new();
        let err = correlator.resolve(999, "ext-1").unwrap_err();
        assert!(matches!(err, CorrelationError::UnknownTransaction(999)));
    }

    #[test]
    fn remove_local_clears_both_maps() {
        let correlator = TransactionCorrelator::new();
        let txn = correlator.create_transaction_id();
        correlator.resolve(txn, "ext-1").unwrap();

        let removed = correlator.remove_local(txn).unwrap();
        assert_eq!(removed.external_id.as_deref(), Some("ext-1"));

        assert!(correlator.is_empty());
        assert_eq!(correlator.local_id("ext-1"), None);
        assert_eq!(correlator.external_id(txn), None);
    }

    #[test]
    fn remove_external_clears_both_maps() {
        let correlator = TransactionCorrelator::new();
        let txn = correlator.create_transaction_id();
        correlator.resolve(txn, "ext-1").unwrap();

        let removed = correlator.remove_external("ext-1").unwrap();
        assert_eq!(removed.local_id, txn);
        assert!(correlator.is_empty());
    }

    #[test]
    fn remove_unresolved_transaction() {
        let correlator = TransactionCorrelator::new();
        let txn = correlator.create_transaction_id();

        let removed = correlator.remove_local(txn).unwrap();
        assert!(removed.external_id.is_none());
        assert!(correlator.remove_local(txn).is_none());
    }

    #[test]
    fn clear_empties_everything() {
        let correlator = TransactionCorrelator::new();
        for i in 0..5 {
            let txn = correlator.create_transaction_id();
            correlator.resolve(txn, &format!("ext-{i}")).unwrap();
        }

        correlator.clear();
        assert!(correlator.is_empty());
        assert_eq!(correlator.local_id("ext-0"), None);
    }

    #[test]
    fn concurrent_create_and_resolve() {
        use std::sync::Arc;
        use std::thread;

        let correlator = Arc::new(TransactionCorrelator::new());
        let mut handles = vec![];

        for i in 0..8 {
            let c = Arc::clone(&correlator);
            handles.push(thread::spawn(move || {
                let txn = c.create_transaction_id();
                c.resolve(txn, &format!("ext-{i}")).unwrap();
                txn
            }));
        }

        let ids: Vec<TransactionId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();

        assert_eq!(deduped.len(), ids.len());
        assert_eq!(correlator.len(), 8);
    }

    proptest! {
        /// However resolve attempts interleave, exactly one external id ever
        /// binds to a local id, and the two maps stay a consistent bijection.
        #[test]
        fn bindings_stay_bijective(attempts in prop::collection::vec((0usize..4, 0usize..4), 1..32)) {
            let correlator = TransactionCorrelator::new();
            let locals: Vec<_> = (0..4).map(|_| correlator.create_transaction_id()).collect();
            let externals = ["e0", "e1", "e2", "e3"];

            let mut bound: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();

            for (l, e) in attempts {
                let outcome = correlator.resolve(locals[l], externals[e]);
                let already_l = bound.get(&l).copied();
                let already_e = bound.iter().find(|&(_, &be)| be == e).map(|(&bl, _)| bl);

                match (already_l, already_e) {
                    (Some(be), _) if be == e => prop_assert!(outcome.is_ok()),
                    (None, None) => {
                        prop_assert!(outcome.is_ok());
                        bound.insert(l, e);
                    }
                    _ => prop_assert!(outcome.is_err()),
                }
            }

            for (l, e) in &bound {
                prop_assert_eq!(correlator.external_id(locals[*l]), Some(externals[*e].to_string()));
                prop_assert_eq!(correlator.local_id(externals[*e]), Some(locals[*l]));
            }
        }
    }
}

//! Subscription Multiplexing
//!
//! Keeps one physical streaming connection per subscription kind consistent
//! with the desired key set, with minimum churn and no lost updates.
//!
//! # Design
//!
//! Each [`StreamMultiplexer`] owns a desired key set tagged with an epoch
//! and a single long-lived worker task. `add`/`remove` mutate the set, bump
//! the epoch, and nudge the worker; the worker reconciles by opening a
//! connection with the key set encoded in the request. Two rules make the
//! races safe:
//!
//! - a connect attempt captures the epoch before dialing and abandons the
//!   connection if the epoch moved while it was in flight (a stale attempt
//!   must not overwrite state a newer one set);
//! - a change while the stream is live closes it to force a full
//!   resubscribe cycle rather than speaking per-venue incremental
//!   subscription protocols. Venues with reliable incremental frames can
//!   replace the close with an incremental send, as long as the epoch check
//!   stays.
//!
//! Transient failures retry with exponential backoff; a run of consecutive
//! failures exhausting the error budget surfaces exactly one fatal event
//! and parks the worker until the desired set changes again.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{InboundStream, RawFrame, StreamConnector};
use crate::domain::message::Symbol;
use crate::domain::subscription::{DesiredKeys, StreamEpoch, SubscriptionKind};
use crate::infrastructure::metrics;

mod heartbeat;
mod retry;
pub mod ws;

pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
pub use retry::{RetryConfig, RetryPolicy};
pub use ws::{WsConnectorConfig, WsStreamConnector};

// =============================================================================
// Types
// =============================================================================

/// Lifecycle phase of one multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// No physical connection and none wanted.
    Stopped,
    /// A connection attempt is due or in flight.
    Starting,
    /// The physical stream is live and being read.
    Started,
    /// The stream is being wound down.
    Stopping,
}

/// Configuration for a multiplexer worker.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Backoff between transient failures.
    pub retry: RetryConfig,
    /// Maximum silence on a live stream before it is recycled.
    pub idle_timeout: Duration,
    /// Consecutive-failure budget before the multiplexer stops with a
    /// fatal error.
    pub max_stream_errors: u32,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            idle_timeout: Duration::from_secs(60),
            max_stream_errors: 10,
        }
    }
}

/// Events a multiplexer worker reports to the session dispatch loop.
#[derive(Debug)]
pub enum StreamEvent {
    /// The physical stream is live for the given epoch.
    Online {
        /// Stream kind.
        kind: SubscriptionKind,
        /// Epoch of the key set the connection was opened with.
        epoch: StreamEpoch,
    },
    /// The physical stream went away (error, close, or resubscribe cycle).
    Offline {
        /// Stream kind.
        kind: SubscriptionKind,
    },
    /// One inbound frame.
    Frame {
        /// Stream kind.
        kind: SubscriptionKind,
        /// The frame.
        frame: RawFrame,
    },
    /// The error budget is exhausted; the multiplexer has stopped.
    Fatal {
        /// Stream kind.
        kind: SubscriptionKind,
        /// Terminal error detail.
        error: String,
    },
}

// =============================================================================
// Multiplexer
// =============================================================================

#[derive(Debug)]
struct MuxState {
    keys: DesiredKeys,
    phase: StreamPhase,
    suspended: bool,
    fatal: bool,
}

/// One logical channel's subscription set and its reconciliation worker.
pub struct StreamMultiplexer {
    kind: SubscriptionKind,
    state: Mutex<MuxState>,
    changed: Notify,
    cancel: CancellationToken,
}

impl StreamMultiplexer {
    /// Create the multiplexer and spawn its worker task.
    ///
    /// The worker runs until `cancel` fires; frames and lifecycle events are
    /// reported on `events`.
    #[must_use]
    pub fn spawn(
        kind: SubscriptionKind,
        config: MuxConfig,
        connector: Arc<dyn StreamConnector>,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let mux = Arc::new(Self {
            kind,
            state: Mutex::new(MuxState {
                keys: DesiredKeys::new(),
                phase: StreamPhase::Stopped,
                suspended: false,
                fatal: false,
            }),
            changed: Notify::new(),
            cancel,
        });

        tokio::spawn(run_worker(Arc::clone(&mux), connector, events, config));
        mux
    }

    /// Stream kind this multiplexer owns.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Add a key to the desired set. Returns false if already present.
    pub fn add(&self, symbol: impl Into<Symbol>) -> bool {
        let mut state = self.state.lock();
        let added = state.keys.insert(symbol);
        if added {
            state.fatal = false;
            if !state.suspended {
                state.phase = StreamPhase::Starting;
            }
            drop(state);
            self.changed.notify_one();
        }
        added
    }

    /// Remove a key from the desired set. Returns false if absent.
    pub fn remove(&self, symbol: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.keys.remove(symbol);
        if removed {
            if state.keys.is_empty() {
                if matches!(state.phase, StreamPhase::Starting | StreamPhase::Started) {
                    state.phase = StreamPhase::Stopping;
                }
            } else if !state.suspended {
                state.phase = StreamPhase::Starting;
            }
            drop(state);
            self.changed.notify_one();
        }
        removed
    }

    /// Clear all keys and wind the stream down.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.keys.clear();
        if matches!(state.phase, StreamPhase::Starting | StreamPhase::Started) {
            state.phase = StreamPhase::Stopping;
        }
        drop(state);
        self.changed.notify_one();
    }

    /// Close the stream but keep the desired set for a later [`resume`].
    ///
    /// [`resume`]: Self::resume
    pub fn suspend(&self) {
        let mut state = self.state.lock();
        state.suspended = true;
        if matches!(state.phase, StreamPhase::Starting | StreamPhase::Started) {
            state.phase = StreamPhase::Stopping;
        }
        drop(state);
        self.changed.notify_one();
    }

    /// Reconnect with the remembered key set after a [`suspend`].
    ///
    /// [`suspend`]: Self::suspend
    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.suspended = false;
        state.fatal = false;
        if !state.keys.is_empty() {
            state.phase = StreamPhase::Starting;
        }
        drop(state);
        self.changed.notify_one();
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.state.lock().phase
    }

    /// Current epoch of the desired set.
    #[must_use]
    pub fn epoch(&self) -> StreamEpoch {
        self.state.lock().keys.epoch()
    }

    /// Snapshot of the desired keys.
    #[must_use]
    pub fn keys(&self) -> Vec<Symbol> {
        self.state.lock().keys.snapshot()
    }

    /// Check whether the multiplexer stopped on an exhausted error budget.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.state.lock().fatal
    }

    /// Snapshot (keys, epoch, active?) for the worker. Also parks the phase
    /// at Stopped when there is nothing to do.
    fn reconcile_snapshot(&self) -> (Vec<Symbol>, StreamEpoch, bool) {
        let mut state = self.state.lock();
        let active = !state.suspended && !state.fatal && !state.keys.is_empty();
        if active {
            state.phase = StreamPhase::Starting;
        } else {
            state.phase = StreamPhase::Stopped;
        }
        (state.keys.snapshot(), state.keys.epoch(), active)
    }

    fn mark_started(&self) {
        self.state.lock().phase = StreamPhase::Started;
    }

    /// Check that a connection opened for `epoch` still reflects what the
    /// owner wants.
    fn still_wanted(&self, epoch: StreamEpoch) -> bool {
        let state = self.state.lock();
        !state.suspended
            && !state.fatal
            && !state.keys.is_empty()
            && state.keys.epoch() == epoch
    }

    fn mark_fatal(&self) {
        let mut state = self.state.lock();
        state.fatal = true;
        state.phase = StreamPhase::Stopped;
    }
}

impl std::fmt::Debug for StreamMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StreamMultiplexer")
            .field("kind", &self.kind)
            .field("phase", &state.phase)
            .field("epoch", &state.keys.epoch())
            .field("keys", &state.keys.len())
            .finish()
    }
}

// =============================================================================
// Worker
// =============================================================================

#[allow(clippy::too_many_lines)]
async fn run_worker(
    mux: Arc<StreamMultiplexer>,
    connector: Arc<dyn StreamConnector>,
    events: mpsc::Sender<StreamEvent>,
    config: MuxConfig,
) {
    let kind = mux.kind;
    let mut retry = RetryPolicy::new(config.retry.clone());
    let mut errors: u32 = 0;

    'outer: loop {
        if mux.cancel.is_cancelled() {
            mux.state.lock().phase = StreamPhase::Stopped;
            break;
        }

        let (symbols, epoch, active) = mux.reconcile_snapshot();
        if !active {
            tokio::select! {
                () = mux.cancel.cancelled() => {
                    break;
                }
                () = mux.changed.notified() => {
                    // A new generation gets a fresh error budget
                    errors = 0;
                    retry.reset();
                    continue;
                }
            }
        }

        tracing::debug!(%kind, epoch, keys = symbols.len(), "opening stream");
        metrics::record_stream_attempt(kind);

        let failure: String = match connector.connect(kind, &symbols).await {
            Ok(mut stream) => {
                // A mutation that raced this connect left a stored wakeup.
                // Drain it, then re-check the epoch: the change is either
                // caught here or its permit is still pending for the read
                // loop, never silently lost.
                let _ = mux.changed.notified().now_or_never();
                if !mux.still_wanted(epoch) {
                    // The desired set (or suspension state) changed while
                    // the connect was in flight; this attempt is stale and
                    // must not win.
                    tracing::debug!(%kind, epoch, "discarding stale connect attempt");
                    stream.close().await;
                    continue;
                }

                mux.mark_started();
                errors = 0;
                retry.reset();
                metrics::set_stream_online(kind, true);
                let _ = events.send(StreamEvent::Online { kind, epoch }).await;

                let reason = 'read: loop {
                    tokio::select! {
                        () = mux.cancel.cancelled() => {
                            stream.close().await;
                            metrics::set_stream_online(kind, false);
                            mux.state.lock().phase = StreamPhase::Stopped;
                            break 'outer;
                        }
                        () = mux.changed.notified() => {
                            // Desired set moved: close and resubscribe
                            tracing::debug!(%kind, "desired set changed, recycling stream");
                            stream.close().await;
                            metrics::set_stream_online(kind, false);
                            let _ = events.send(StreamEvent::Offline { kind }).await;
                            continue 'outer;
                        }
                        next = tokio::time::timeout(config.idle_timeout, stream.next_frame()) => {
                            match next {
                                Ok(Ok(Some(frame))) => {
                                    metrics::record_frame_received(kind);
                                    let _ = events.send(StreamEvent::Frame { kind, frame }).await;
                                }
                                Ok(Ok(None)) => break 'read "stream closed by venue".to_string(),
                                Ok(Err(e)) => break 'read e.to_string(),
                                Err(_) => {
                                    break 'read format!(
                                        "no data within {:?}",
                                        config.idle_timeout
                                    );
                                }
                            }
                        }
                    }
                };

                stream.close().await;
                metrics::set_stream_online(kind, false);
                let _ = events.send(StreamEvent::Offline { kind }).await;
                reason
            }
            Err(e) => e.to_string(),
        };

        errors += 1;
        tracing::warn!(%kind, error = %failure, consecutive = errors, "stream failure");

        if errors >= config.max_stream_errors {
            mux.mark_fatal();
            metrics::record_stream_fatal(kind);
            tracing::error!(
                %kind,
                budget = config.max_stream_errors,
                "error budget exhausted, stopping stream"
            );
            let _ = events.send(StreamEvent::Fatal { kind, error: failure }).await;
            continue;
        }

        let delay = retry.next_delay();
        tracing::debug!(%kind, delay_ms = delay.as_millis(), "retrying after backoff");
        tokio::select! {
            () = mux.cancel.cancelled() => {
                mux.state.lock().phase = StreamPhase::Stopped;
                break;
            }
            () = mux.changed.notified() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!(%kind, "stream worker exited");
}

// =============================================================================
// Tests
// =============================================================================

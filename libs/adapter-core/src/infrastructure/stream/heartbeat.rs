//! Stream Heartbeat
//!
//! Ping/pong liveness monitoring for WebSocket streams. A quiet connection
//! is indistinguishable from a dead one; the heartbeat turns silence into a
//! timeout the worker can react to.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Deadline for a pong after a ping was sent.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

/// Events the heartbeat monitor asks the stream to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Time to send a ping frame.
    PingDue,
    /// The pong deadline passed; the connection should be abandoned.
    Deadline,
}

/// Liveness state shared between the monitor and the stream reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_pong: RwLock<Instant>,
    awaiting_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Fresh state for a new connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_pong: RwLock::new(Instant::now()),
            awaiting_pong: AtomicBool::new(false),
        }
    }

    /// Record inbound liveness (a pong, or any data frame).
    pub fn pong_received(&self) {
        *self.last_pong.write() = Instant::now();
        self.awaiting_pong.store(false, Ordering::SeqCst);
    }

    /// Record that a ping went out and a pong is now expected.
    pub fn ping_sent(&self) {
        self.awaiting_pong.store(true, Ordering::SeqCst);
    }

    /// Check whether the pong deadline has passed.
    #[must_use]
    pub fn overdue(&self, timeout: Duration) -> bool {
        self.awaiting_pong.load(Ordering::SeqCst) && self.last_pong.read().elapsed() > timeout
    }
}

/// Periodic monitor driving pings and detecting dead connections.
///
/// Runs until cancelled or until a deadline fires; the owning stream sends
/// the actual ping frames and records pongs on the shared state.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    events: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        events: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            events,
            cancel,
        }
    }

    /// Run the monitoring loop.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.state.overdue(self.config.pong_timeout) {
                        tracing::warn!(
                            timeout_secs = self.config.pong_timeout.as_secs(),
                            "heartbeat deadline passed"
                        );
                        let _ = self.events.send(HeartbeatEvent::Deadline).await;
                        break;
                    }
                    if self.events.send(HeartbeatEvent::PingDue).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.pong_timeout, Duration::from_secs(20));
    }

    #[test]
    fn state_tracks_pending_pong() {
        let state = HeartbeatState::new();
        assert!(!state.overdue(Duration::from_millis(0)));

        state.ping_sent();
        std::thread::sleep(Duration::from_millis(5));
        assert!(state.overdue(Duration::from_millis(1)));

        state.pong_received();
        assert!(!state.overdue(Duration::from_millis(1)));
    }

    #[tokio::test]
    async fn monitor_emits_ping_events() {
        let config = HeartbeatConfig {
            ping_interval: Duration::from_millis(20),
            pong_timeout: Duration::from_secs(5),
        };
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(config, state, tx, cancel.clone()).run(),
        );

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("should receive event")
            .expect("channel open");
        assert_eq!(event, HeartbeatEvent::PingDue);

        cancel.cancel();
        handle.await.expect("clean shutdown");
    }

    #[tokio::test]
    async fn monitor_detects_deadline() {
        let config = HeartbeatConfig {
            ping_interval: Duration::from_millis(10),
            pong_timeout: Duration::from_millis(20),
        };
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        state.ping_sent();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(config, state, tx, cancel.clone()).run(),
        );

        let mut saw_deadline = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            if event == HeartbeatEvent::Deadline {
                saw_deadline = true;
                break;
            }
        }
        assert!(saw_deadline, "expected a deadline event");

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn monitor_stops_on_cancel() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(HeartbeatConfig::default(), state, tx, cancel.clone()).run(),
        );

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "monitor should shut down promptly");
    }
}

//! Prometheus Metrics Module
//!
//! Adapter instrumentation via the `metrics` facade with a Prometheus
//! recorder.
//!
//! # Metrics Categories
//!
//! - **Frames**: counts of frames received and dropped per stream kind
//! - **Streams**: connect attempts, online gauges, fatal stops
//! - **Commands**: outbound command counts by outcome
//! - **Correlation**: pending-transaction gauge

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::SubscriptionKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if a different recorder is already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "adapter_frames_received_total",
        "Frames received from venue streams"
    );
    describe_counter!(
        "adapter_frames_dropped_total",
        "Frames dropped due to translation errors"
    );
    describe_counter!(
        "adapter_stream_attempts_total",
        "Physical stream connection attempts"
    );
    describe_counter!(
        "adapter_stream_fatal_total",
        "Streams stopped after exhausting their error budget"
    );
    describe_counter!(
        "adapter_commands_total",
        "Outbound commands by outcome"
    );
    describe_gauge!(
        "adapter_stream_online",
        "Whether the physical stream for a kind is live"
    );
    describe_gauge!(
        "adapter_subscriptions",
        "Desired subscription keys per stream kind"
    );
    describe_gauge!(
        "adapter_pending_transactions",
        "Transactions awaiting a terminal state"
    );
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a frame received on a stream.
pub fn record_frame_received(kind: SubscriptionKind) {
    counter!("adapter_frames_received_total", "kind" => kind.as_str()).increment(1);
}

/// Record a frame dropped by translation.
pub fn record_frame_dropped(kind: SubscriptionKind) {
    counter!("adapter_frames_dropped_total", "kind" => kind.as_str()).increment(1);
}

/// Record a physical connection attempt.
pub fn record_stream_attempt(kind: SubscriptionKind) {
    counter!("adapter_stream_attempts_total", "kind" => kind.as_str()).increment(1);
}

/// Record a stream stopping on an exhausted error budget.
pub fn record_stream_fatal(kind: SubscriptionKind) {
    counter!("adapter_stream_fatal_total", "kind" => kind.as_str()).increment(1);
}

/// Update the online gauge for a stream kind.
pub fn set_stream_online(kind: SubscriptionKind, online: bool) {
    gauge!("adapter_stream_online", "kind" => kind.as_str()).set(if online { 1.0 } else { 0.0 });
}

/// Update the subscription-count gauge for a stream kind.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscription_count(kind: SubscriptionKind, count: usize) {
    gauge!("adapter_subscriptions", "kind" => kind.as_str()).set(count as f64);
}

/// Update the pending-transaction gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending_transactions(count: usize) {
    gauge!("adapter_pending_transactions").set(count as f64);
}

/// Record an outbound command outcome.
pub fn record_command(outcome: &'static str) {
    counter!("adapter_commands_total", "outcome" => outcome).increment(1);
}

// =============================================================================
// Tests
// =============================================================================

//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the port interfaces plus the session
//! machinery that wires them together.

/// Request signing and credentials.
pub mod auth;

/// Broadcast fan-out of normalized messages.
pub mod broadcast;

/// Environment-driven configuration.
pub mod config;

/// Transaction-id correlation.
pub mod correlation;

/// HTTP command client.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Connection lifecycle controller.
pub mod session;

/// Subscription multiplexing over streaming connections.
pub mod stream;

/// Tracing integration.
pub mod telemetry;

/// Translation helpers and the reference wire dialect.
pub mod translate;

//! Tracing Integration
//!
//! Structured logging setup built on `tracing-subscriber`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `adapter_core=info`)
//!
//! # Usage
//!
//! ```rust
//! adapter_core::infrastructure::telemetry::init();
//! tracing::info!("adapter starting");
//! ```

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Reads `RUST_LOG` for filter directives and falls back to `adapter_core=info`.
/// Safe to call more than once: later calls are no-ops, which keeps test
/// binaries (where every test may initialize) from panicking.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("adapter_core=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        tracing::debug!("still alive");
    }
}

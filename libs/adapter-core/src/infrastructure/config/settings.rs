//! Adapter Configuration Settings
//!
//! Configuration types for one venue adapter, loaded from environment
//! variables with the `ADAPTER_` prefix.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ADAPTER_API_KEY` / `ADAPTER_API_SECRET`: venue credentials
//! - `ADAPTER_STREAM_URL`: WebSocket endpoint
//! - `ADAPTER_COMMAND_URL`: command API base URL
//!
//! ## Optional
//! - `ADAPTER_VENUE`: venue name for logs (default: `generic`)
//! - `ADAPTER_SIGNATURE_ENCODING`: `hex` | `base64` (default: hex)
//! - `ADAPTER_STATUS_PATH`: handshake probe path (default: none)
//! - `ADAPTER_RETAIN_SUBSCRIPTIONS`: keep key sets across disconnect
//!   (default: true)
//! - `ADAPTER_IDLE_TIMEOUT_SECS`, `ADAPTER_MAX_STREAM_ERRORS`,
//!   `ADAPTER_RETRY_INITIAL_MS`, `ADAPTER_RETRY_MAX_SECS`,
//!   `ADAPTER_RETRY_MULTIPLIER`, `ADAPTER_HEARTBEAT_INTERVAL_SECS`,
//!   `ADAPTER_HEARTBEAT_TIMEOUT_SECS`, `ADAPTER_REQUEST_TIMEOUT_SECS`

use std::time::Duration;

use crate::infrastructure::auth::{AuthError, Credentials, SignatureEncoding};
use crate::infrastructure::broadcast::HubConfig;
use crate::infrastructure::http::HttpClientConfig;
use crate::infrastructure::stream::{HeartbeatConfig, MuxConfig, RetryConfig, WsConnectorConfig};

// =============================================================================
// Sub-settings
// =============================================================================

/// Streaming-connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint URL.
    pub url: String,
    /// Maximum silence on a live stream before it is recycled.
    pub idle_timeout: Duration,
    /// Consecutive-failure budget per multiplexer.
    pub max_stream_errors: u32,
    /// Backoff between transient failures.
    pub retry: RetryConfig,
    /// Heartbeat behavior.
    pub heartbeat: HeartbeatConfig,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            idle_timeout: Duration::from_secs(60),
            max_stream_errors: 10,
            retry: RetryConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl StreamSettings {
    /// Multiplexer-worker configuration slice of these settings.
    #[must_use]
    pub fn to_mux_config(&self) -> MuxConfig {
        MuxConfig {
            retry: self.retry.clone(),
            idle_timeout: self.idle_timeout,
            max_stream_errors: self.max_stream_errors,
        }
    }

    /// WebSocket-connector configuration slice of these settings.
    #[must_use]
    pub fn to_ws_config(&self) -> WsConnectorConfig {
        WsConnectorConfig {
            url: self.url.clone(),
            heartbeat: self.heartbeat.clone(),
        }
    }
}

/// Command-path settings.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    /// Command API base URL.
    pub base_url: String,
    /// Handshake probe path; `None` for stateless venues.
    pub status_path: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            status_path: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl CommandSettings {
    /// HTTP-client configuration slice of these settings.
    #[must_use]
    pub fn to_http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.base_url.clone(),
            status_path: self.status_path.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

/// Channel capacities for the hub and the inbound frame queue.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Connection-state channel capacity.
    pub connection_capacity: usize,
    /// Order channel capacity.
    pub orders_capacity: usize,
    /// Book channel capacity.
    pub books_capacity: usize,
    /// Trade channel capacity.
    pub trades_capacity: usize,
    /// Balance channel capacity.
    pub balances_capacity: usize,
    /// Error channel capacity.
    pub errors_capacity: usize,
    /// Inbound frame queue capacity (multiplexers → dispatch).
    pub inbound_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            connection_capacity: 64,
            orders_capacity: 1_000,
            books_capacity: 10_000,
            trades_capacity: 10_000,
            balances_capacity: 1_000,
            errors_capacity: 256,
            inbound_capacity: 1_024,
        }
    }
}

impl From<&ChannelSettings> for HubConfig {
    fn from(settings: &ChannelSettings) -> Self {
        Self {
            connection_capacity: settings.connection_capacity,
            orders_capacity: settings.orders_capacity,
            books_capacity: settings.books_capacity,
            trades_capacity: settings.trades_capacity,
            balances_capacity: settings.balances_capacity,
            errors_capacity: settings.errors_capacity,
        }
    }
}

// =============================================================================
// Adapter Configuration
// =============================================================================

/// Complete configuration for one venue adapter session.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Venue name for logs and error context.
    pub venue: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Digest encoding the venue expects.
    pub signature_encoding: SignatureEncoding,
    /// Streaming settings.
    pub stream: StreamSettings,
    /// Command-path settings.
    pub command: CommandSettings,
    /// Channel capacities.
    pub channels: ChannelSettings,
    /// Keep subscription key sets across disconnect/connect cycles.
    pub retain_subscriptions: bool,
}

impl AdapterConfig {
    /// Create a configuration with defaults for everything optional.
    #[must_use]
    pub fn new(
        credentials: Credentials,
        stream_url: impl Into<String>,
        command_url: impl Into<String>,
    ) -> Self {
        Self {
            venue: "generic".to_string(),
            credentials,
            signature_encoding: SignatureEncoding::Hex,
            stream: StreamSettings {
                url: stream_url.into(),
                ..StreamSettings::default()
            },
            command: CommandSettings {
                base_url: command_url.into(),
                ..CommandSettings::default()
            },
            channels: ChannelSettings::default(),
            retain_subscriptions: true,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials = Credentials::from_env()?;
        let stream_url = require_env("ADAPTER_STREAM_URL")?;
        let command_url = require_env("ADAPTER_COMMAND_URL")?;

        let venue = std::env::var("ADAPTER_VENUE").unwrap_or_else(|_| "generic".to_string());

        let signature_encoding = std::env::var("ADAPTER_SIGNATURE_ENCODING")
            .map(|v| {
                if v.eq_ignore_ascii_case("base64") {
                    SignatureEncoding::Base64
                } else {
                    SignatureEncoding::Hex
                }
            })
            .unwrap_or_default();

        let stream = StreamSettings {
            url: stream_url,
            idle_timeout: parse_env_duration_secs(
                "ADAPTER_IDLE_TIMEOUT_SECS",
                StreamSettings::default().idle_timeout,
            ),
            max_stream_errors: parse_env_u32(
                "ADAPTER_MAX_STREAM_ERRORS",
                StreamSettings::default().max_stream_errors,
            ),
            retry: RetryConfig {
                initial_delay: parse_env_duration_millis(
                    "ADAPTER_RETRY_INITIAL_MS",
                    RetryConfig::default().initial_delay,
                ),
                max_delay: parse_env_duration_secs(
                    "ADAPTER_RETRY_MAX_SECS",
                    RetryConfig::default().max_delay,
                ),
                multiplier: parse_env_f64(
                    "ADAPTER_RETRY_MULTIPLIER",
                    RetryConfig::default().multiplier,
                ),
                jitter: RetryConfig::default().jitter,
            },
            heartbeat: HeartbeatConfig {
                ping_interval: parse_env_duration_secs(
                    "ADAPTER_HEARTBEAT_INTERVAL_SECS",
                    HeartbeatConfig::default().ping_interval,
                ),
                pong_timeout: parse_env_duration_secs(
                    "ADAPTER_HEARTBEAT_TIMEOUT_SECS",
                    HeartbeatConfig::default().pong_timeout,
                ),
            },
        };

        let command = CommandSettings {
            base_url: command_url,
            status_path: std::env::var("ADAPTER_STATUS_PATH").ok().filter(|v| !v.is_empty()),
            request_timeout: parse_env_duration_secs(
                "ADAPTER_REQUEST_TIMEOUT_SECS",
                CommandSettings::default().request_timeout,
            ),
        };

        let retain_subscriptions = std::env::var("ADAPTER_RETAIN_SUBSCRIPTIONS")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Ok(Self {
            venue,
            credentials,
            signature_encoding,
            stream,
            command,
            channels: ChannelSettings::default(),
            retain_subscriptions,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Credential values are unusable.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    let value =
        std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Load a `.env` file from the current directory or any ancestor.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

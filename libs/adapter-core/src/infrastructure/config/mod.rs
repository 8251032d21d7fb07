//! Configuration Module
//!
//! Environment-driven configuration for a venue adapter session.

mod settings;

pub use settings::{
    AdapterConfig, ChannelSettings, CommandSettings, ConfigError, StreamSettings, load_dotenv,
};

//! Voice Gateway Configuration
//!
//! Settings are loaded from the environment: flat keys (`PORT`,
//! `REQUIRE_AUTH`) configure the gateway itself, double-underscore keys
//! (`STT__ENDPOINT`, `STORE__HOSTS`, ...) configure the external
//! collaborators.

pub mod settings;

pub use settings::{
    load_settings, AuthServiceConfig, LimitsConfig, ObservabilityConfig, ResolverServiceConfig,
    Settings, StoreServiceConfig, SttServiceConfig, TtsServiceConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

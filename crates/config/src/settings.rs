//! Main settings module

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Refuse unauthenticated connections and turns
    #[serde(default)]
    pub require_auth: bool,

    /// Identity provider (token verification)
    #[serde(default)]
    pub auth: AuthServiceConfig,

    /// Speech-to-text service
    #[serde(default)]
    pub stt: SttServiceConfig,

    /// Text-to-speech service
    #[serde(default)]
    pub tts: TtsServiceConfig,

    /// Contextual query engine
    #[serde(default)]
    pub resolver: ResolverServiceConfig,

    /// Document store
    #[serde(default)]
    pub store: StoreServiceConfig,

    /// Connection resource limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.25..=4.0).contains(&self.tts.speaking_rate) {
            return Err(ConfigError::InvalidValue {
                field: "tts.speaking_rate".to_string(),
                message: "speaking rate must be between 0.25 and 4.0".to_string(),
            });
        }

        let deadlines = [
            ("stt.timeout_seconds", self.stt.timeout_seconds),
            ("tts.timeout_seconds", self.tts.timeout_seconds),
            ("resolver.timeout_seconds", self.resolver.timeout_seconds),
            ("store.timeout_seconds", self.store.timeout_seconds),
        ];
        for (field, value) in deadlines {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "deadline must be at least one second".to_string(),
                });
            }
        }

        if self.limits.outbox_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.outbox_capacity".to_string(),
                message: "send buffer must hold at least one frame".to_string(),
            });
        }

        Ok(())
    }
}

/// Identity provider configuration (credentials are opaque to the gateway)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthServiceConfig {
    /// Token verification endpoint
    #[serde(default = "default_auth_endpoint")]
    pub endpoint: String,

    /// Service credential forwarded to the provider
    #[serde(default)]
    pub api_key: Option<String>,

    /// Verification call deadline
    #[serde(default = "default_auth_timeout")]
    pub timeout_seconds: u64,
}

fn default_auth_endpoint() -> String {
    "http://localhost:7001/verify".to_string()
}
fn default_auth_timeout() -> u64 {
    5
}

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_auth_endpoint(),
            api_key: None,
            timeout_seconds: default_auth_timeout(),
        }
    }
}

/// Speech-to-text service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttServiceConfig {
    #[serde(default = "default_stt_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Recognition language
    #[serde(default = "default_language")]
    pub language_code: String,

    /// Expected sample rate of inbound audio
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,

    /// Recognition call deadline
    #[serde(default = "default_stt_timeout")]
    pub timeout_seconds: u64,
}

fn default_stt_endpoint() -> String {
    "http://localhost:7002/v1/speech:recognize".to_string()
}
fn default_language() -> String {
    "en-IN".to_string()
}
fn default_sample_rate() -> u32 {
    16000
}
fn default_stt_timeout() -> u64 {
    15
}

impl Default for SttServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_stt_endpoint(),
            api_key: None,
            language_code: default_language(),
            sample_rate_hz: default_sample_rate(),
            timeout_seconds: default_stt_timeout(),
        }
    }
}

/// Text-to-speech service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsServiceConfig {
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Synthesis language
    #[serde(default = "default_language")]
    pub language_code: String,

    /// Named voice
    #[serde(default = "default_voice_name")]
    pub voice_name: String,

    /// Voice gender hint
    #[serde(default = "default_gender")]
    pub gender: String,

    /// Slightly slower than natural for comprehension
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f32,

    /// Synthesis call deadline
    #[serde(default = "default_tts_timeout")]
    pub timeout_seconds: u64,
}

fn default_tts_endpoint() -> String {
    "http://localhost:7003/v1/text:synthesize".to_string()
}
fn default_voice_name() -> String {
    "en-IN-Standard-A".to_string()
}
fn default_gender() -> String {
    "NEUTRAL".to_string()
}
fn default_speaking_rate() -> f32 {
    0.9
}
fn default_tts_timeout() -> u64 {
    15
}

impl Default for TtsServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_tts_endpoint(),
            api_key: None,
            language_code: default_language(),
            voice_name: default_voice_name(),
            gender: default_gender(),
            speaking_rate: default_speaking_rate(),
            timeout_seconds: default_tts_timeout(),
        }
    }
}

/// Contextual query engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverServiceConfig {
    #[serde(default = "default_resolver_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Resolution call deadline
    #[serde(default = "default_resolver_timeout")]
    pub timeout_seconds: u64,
}

fn default_resolver_endpoint() -> String {
    "http://localhost:7004/query".to_string()
}
fn default_resolver_timeout() -> u64 {
    20
}

impl Default for ResolverServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_resolver_endpoint(),
            api_key: None,
            timeout_seconds: default_resolver_timeout(),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreServiceConfig {
    /// Cluster contact points
    #[serde(default = "default_store_hosts")]
    pub hosts: Vec<String>,

    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication")]
    pub replication_factor: u8,

    /// Append/read call deadline
    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,
}

fn default_store_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}
fn default_keyspace() -> String {
    "voice_gateway".to_string()
}
fn default_replication() -> u8 {
    1
}
fn default_store_timeout() -> u64 {
    5
}

impl Default for StoreServiceConfig {
    fn default() -> Self {
        Self {
            hosts: default_store_hosts(),
            keyspace: default_keyspace(),
            replication_factor: default_replication(),
            timeout_seconds: default_store_timeout(),
        }
    }
}

/// Per-connection resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// High-water mark for buffered outbound frames; a connection that
    /// exceeds it is closed with policy-violation rather than buffered
    /// without bound
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Largest accepted binary audio frame
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: usize,
}

fn default_outbox_capacity() -> usize {
    64
}
fn default_max_audio_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
            max_audio_bytes: default_max_audio_bytes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_port() -> u16 {
    7000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            require_auth: false,
            auth: AuthServiceConfig::default(),
            stt: SttServiceConfig::default(),
            tts: TtsServiceConfig::default(),
            resolver: ResolverServiceConfig::default(),
            store: StoreServiceConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Load settings from environment variables
///
/// Flat keys map to top-level fields (`PORT`, `REQUIRE_AUTH`); nested
/// collaborator settings use a double-underscore separator
/// (`STT__ENDPOINT`, `TTS__VOICE_NAME`, `STORE__HOSTS`).
pub fn load_settings() -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(Environment::default().separator("__").try_parsing(true))
        .build()?;

    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.port, 7000);
        assert!(!settings.require_auth);
        assert_eq!(settings.stt.language_code, "en-IN");
        assert_eq!(settings.stt.sample_rate_hz, 16000);
        assert_eq!(settings.stt.timeout_seconds, 15);
        assert_eq!(settings.resolver.timeout_seconds, 20);
        assert_eq!(settings.store.timeout_seconds, 5);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.tts.speaking_rate = 9.0;
        assert!(settings.validate().is_err());

        settings.tts.speaking_rate = 0.9;
        assert!(settings.validate().is_ok());

        settings.limits.outbox_capacity = 0;
        assert!(settings.validate().is_err());
    }
}

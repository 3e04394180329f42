//! Configuration Module
//!
//! Provides TOML-based configuration for the bridge node with support for:
//! - Logging settings
//! - MQTT broker connection parameters
//! - Private path prefix for topic namespace rewriting
//! - Default and per-bridge codec selection
//! - The declarative bridge mapping list
//! - Environment variable overrides (MQBRIDGE__* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use bridge::{BridgeFactory, BridgeMapping};

mod bridge;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// MQTT side: connection parameters and private path prefix
    pub mqtt: MqttConfig,
    /// Default serializer registry name
    #[serde(default = "default_codec")]
    pub serializer: String,
    /// Default deserializer registry name
    #[serde(default = "default_codec")]
    pub deserializer: String,
    /// Declarative bridge mapping list, in activation order
    #[serde(default)]
    pub bridge: Vec<BridgeMapping>,
}

fn default_codec() -> String {
    "json".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// MQTT-side configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker connection parameters. Required: a node without a broker
    /// connection cannot bridge anything.
    pub connection: Option<ConnectionConfig>,

    /// Namespace prefix substituted for the `~` marker in topic names.
    /// Empty means no rewriting.
    #[serde(default)]
    pub private_path: String,
}

/// Broker connection parameters, enumerated exhaustively.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Broker hostname or IP address
    pub host: String,

    /// Broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval (e.g. "60s")
    #[serde(with = "humantime_serde", default = "default_keep_alive")]
    pub keep_alive: Duration,

    /// Start with a clean session
    #[serde(default = "default_true")]
    pub clean_session: bool,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    format!("mqbridge-{}", std::process::id())
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file with env var substitution and
    /// `MQBRIDGE__SECTION__KEY` environment overrides. A missing file
    /// falls back to defaults (which then fail validation for lack of a
    /// connection section).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("mqtt.private_path", "")?
            .set_default("serializer", "json")?
            .set_default("deserializer", "json")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (MQBRIDGE__MQTT__PRIVATE_PATH, etc.)
        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("MQBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Startup aborts here, before any broker
    /// client or bridge exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.connection.is_none() {
            return Err(ConfigError::Validation(
                "mqtt.connection section is required".to_string(),
            ));
        }

        for mapping in &self.bridge {
            if mapping.topic_from.is_empty() || mapping.topic_to.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "bridge mapping {} has an empty topic",
                    mapping.factory
                )));
            }
            if let Some(frequency) = mapping.frequency {
                if !frequency.is_finite() || frequency <= 0.0 {
                    return Err(ConfigError::Validation(format!(
                        "bridge mapping {} -> {} has non-positive frequency",
                        mapping.topic_from, mapping.topic_to
                    )));
                }
            }
        }

        Ok(())
    }

    /// The validated broker connection parameters.
    pub fn connection(&self) -> Result<&ConnectionConfig, ConfigError> {
        self.mqtt.connection.as_ref().ok_or_else(|| {
            ConfigError::Validation("mqtt.connection section is required".to_string())
        })
    }
}

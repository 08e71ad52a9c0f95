//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::directory::ClientRecord;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Limit, LimitSettings};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Log level filter (e.g. `info`, `debug`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Limit applied to clients without their own record
    #[serde(default)]
    pub default_limit: LimitSettings,

    /// Background refill tick in milliseconds
    #[serde(default = "default_refill_tick_ms")]
    pub refill_tick_ms: u64,

    /// Clients known at startup
    #[serde(default)]
    pub client_rate_limits: Vec<ClientLimitConfig>,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            default_limit: LimitSettings::default(),
            refill_tick_ms: default_refill_tick_ms(),
            client_rate_limits: Vec::new(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_address")]
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A client entry in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLimitConfig {
    /// API key of the client
    pub key: String,
    /// Limit settings for the client
    #[serde(flatten)]
    pub limit: LimitSettings,
}

impl ClientLimitConfig {
    /// Convert to a directory record.
    pub fn to_record(&self) -> ClientRecord {
        ClientRecord::new(
            self.key.clone(),
            self.limit.capacity,
            self.limit.refill_rate_seconds,
            self.limit.unlimited,
        )
    }
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_refill_tick_ms() -> u64 {
    100
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file with environment overrides.
    ///
    /// A missing file is not an error. Variables such as
    /// `TURNSTILE_SERVER__ADDRESS` or `TURNSTILE_DEFAULT_LIMIT__CAPACITY`
    /// override file values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TurnstileConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.refill_tick_ms == 0 {
            return Err(TurnstileError::Config(
                "refill_tick_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(client) = self.client_rate_limits.iter().find(|c| c.key.trim().is_empty()) {
            return Err(TurnstileError::Config(format!(
                "client_rate_limits entry with capacity {} has an empty key",
                client.limit.capacity
            )));
        }
        Ok(())
    }

    /// The default limit as a bucket limit.
    pub fn default_limit(&self) -> Limit {
        Limit::from_settings(&self.default_limit)
    }

    /// Background refill tick.
    pub fn refill_tick(&self) -> Duration {
        Duration::from_millis(self.refill_tick_ms)
    }

    /// Client records to seed the directory with.
    pub fn client_records(&self) -> Vec<ClientRecord> {
        self.client_rate_limits.iter().map(ClientLimitConfig::to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.refill_tick(), Duration::from_millis(100));
        assert_eq!(config.default_limit(), Limit::new(10, Duration::from_secs(1)));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  address: 127.0.0.1:9000
log_level: debug
log_format: json
default_limit:
  capacity: 20
  refill_rate_seconds: 2
refill_tick_ms: 250
client_rate_limits:
  - key: partner
    capacity: 100
    refill_rate_seconds: 1
  - key: internal
    unlimited: true
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_limit(), Limit::new(20, Duration::from_secs(2)));
        assert_eq!(config.refill_tick(), Duration::from_millis(250));

        let records = config.client_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "partner");
        assert_eq!(records[0].capacity, 100);
        assert!(records[1].unlimited);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = TurnstileConfig::from_yaml("{}").unwrap();
        assert!(config.client_rate_limits.is_empty());
        assert_eq!(config.default_limit.capacity, 10);
    }

    #[test]
    fn test_zero_refill_tick_rejected() {
        let result = TurnstileConfig::from_yaml("refill_tick_ms: 0");
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_empty_client_key_rejected() {
        let yaml = r#"
client_rate_limits:
  - key: ""
    capacity: 5
"#;
        assert!(TurnstileConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "default_limit:\n  capacity: 3\n  refill_rate_seconds: 5\n").unwrap();

        let config = TurnstileConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.default_limit(), Limit::new(3, Duration::from_secs(5)));
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let result = TurnstileConfig::from_file("/nonexistent/turnstile.yaml");
        assert!(matches!(result, Err(TurnstileError::Io(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = TurnstileConfig::load("/nonexistent/turnstile.yaml").unwrap();
        assert_eq!(config.refill_tick_ms, 100);
    }
}

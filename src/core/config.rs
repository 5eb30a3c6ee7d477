//! Configuration management for the telemetry agent.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides (see `cli`)
//! - Validation and defaults

use crate::core::retry::RetryConfig;
use crate::core::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for the export agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote sink configuration
    pub sink: SinkConfig,
    /// Scheduling and failure recovery
    pub agent: AgentConfig,
    /// Backoff between retries of a failed batch
    pub retry: RetryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Remote sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Base URL of the time-series server
    pub url: String,
    /// Authentication token
    pub token: String,
    /// Organization (namespace) the buckets live in
    pub organization: String,
    /// Maximum lines sent in one write request
    pub batch_size: usize,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Agent scheduling and spill configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Period of both the flush and the replay task
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// After each flush, evict vector tuples nobody holds and nobody updated
    pub clear_value: bool,
    /// Retries of a failed batch before it is spilled to disk
    pub retry_attempts: u32,
    /// Directory holding spilled batches, one `<bucket>.txt` per bucket
    pub backup_dir: PathBuf,
    /// Register the agent's own counters alongside application metrics
    pub self_metrics: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sink: SinkConfig::default(),
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            organization: "default".to_string(),
            batch_size: 5000,
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            interval: Duration::from_secs(5),
            clear_value: true,
            retry_attempts: 3,
            backup_dir: PathBuf::from("./telemetry_backup"),
            self_metrics: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sink.url.trim().is_empty() {
            return Err(TelemetryError::config("sink url must not be empty"));
        }

        if self.sink.organization.trim().is_empty() {
            return Err(TelemetryError::config("organization must not be empty"));
        }

        if self.sink.batch_size == 0 {
            return Err(TelemetryError::config("batch_size must be greater than 0"));
        }

        if self.agent.interval.is_zero() {
            return Err(TelemetryError::config("interval must be greater than 0"));
        }

        if self.agent.backup_dir.as_os_str().is_empty() {
            return Err(TelemetryError::config("backup_dir must not be empty"));
        }

        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(TelemetryError::config(format!(
                "retry multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }

        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(TelemetryError::config(format!(
                "initial_backoff ({:?}) exceeds max_backoff ({:?})",
                self.retry.initial_backoff, self.retry.max_backoff
            )));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| TelemetryError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set sink URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.sink.url = url.into();
        self
    }

    /// Set auth token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.sink.token = token.into();
        self
    }

    /// Set organization
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.config.sink.organization = organization.into();
        self
    }

    /// Set gather/replay interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.agent.interval = interval;
        self
    }

    /// Set retry attempts before spilling
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.agent.retry_attempts = attempts;
        self
    }

    /// Set backup directory
    pub fn backup_dir(mut self, path: PathBuf) -> Self {
        self.config.agent.backup_dir = path;
        self
    }

    /// Set clear-value behaviour
    pub fn clear_value(mut self, clear: bool) -> Self {
        self.config.agent.clear_value = clear;
        self
    }

    /// Enable or disable the agent's own metrics
    pub fn self_metrics(mut self, enable: bool) -> Self {
        self.config.agent.self_metrics = enable;
        self
    }

    /// Set batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.sink.batch_size = size;
        self
    }

    /// Set retry backoff policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.agent.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_bounds_rejected() {
        let mut config = Config::default();
        config.retry.initial_backoff = Duration::from_secs(30);
        config.retry.max_backoff = Duration::from_secs(1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .url("http://influx:8086")
            .token("secret")
            .organization("my-org")
            .interval(Duration::from_secs(2))
            .retry_attempts(5)
            .clear_value(false)
            .debug(true)
            .build();

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.sink.url, "http://influx:8086");
        assert_eq!(config.sink.organization, "my-org");
        assert_eq!(config.agent.interval, Duration::from_secs(2));
        assert_eq!(config.agent.retry_attempts, 5);
        assert!(!config.agent.clear_value);
        assert!(config.debug);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
sink:
  url: "http://localhost:8086"
  token: my-token
  organization: my-org
agent:
  interval: 5s
  retry_attempts: 2
  backup_dir: /var/lib/telemetry
retry:
  initial_backoff: 50ms
  max_backoff: 2s
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build();

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.sink.token, "my-token");
        assert_eq!(config.sink.batch_size, 5000);
        assert_eq!(config.agent.interval, Duration::from_secs(5));
        assert_eq!(config.agent.retry_attempts, 2);
        assert_eq!(config.agent.backup_dir, PathBuf::from("/var/lib/telemetry"));
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(50));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.agent.clear_value);
    }
}

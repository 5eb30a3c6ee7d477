//! Configuration, errors and retry policy shared by the metrics and export layers.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;

// Re-export commonly used types
pub use config::{AgentConfig, Config, ConfigBuilder, LogLevel, LoggingConfig, SinkConfig};
pub use error::{MetricError, Result, TelemetryError};
pub use retry::RetryConfig;

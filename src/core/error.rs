//! Error types for metric construction and the export pipeline.

use thiserror::Error;

/// Validation failures raised while building descriptors, items and vectors.
///
/// Kept `Copy` so an errored item can hand the same error out on every
/// `write` without owning anything.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricError {
    #[error("invalid tag values")]
    InvalidTagValues,

    #[error("required tag names are missing")]
    RequiredTagNames,

    #[error("required fields are missing in the item options")]
    RequiredFields,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Backup store error: {0}")]
    Backup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Agent is already running")]
    AlreadyStarted,
}

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

impl TelemetryError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new sink error
    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::Sink(msg.into())
    }

    /// Creates a new backup store error
    pub fn backup<S: Into<String>>(msg: S) -> Self {
        Self::Backup(msg.into())
    }

    /// Returns true if retrying the failed operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Sink(_) | Self::Io(_) => true,
            Self::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().map_or(true, |status| status.is_server_error())
            },
            _ => false,
        }
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Metric(_) => "validation",
            Self::Config(_) => "config",
            Self::Sink(_) | Self::Http(_) => "sink",
            Self::Backup(_) | Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) | Self::AlreadyStarted => "async",
        }
    }
}

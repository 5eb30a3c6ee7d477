//! Command-line interface for the telemetry agent.
//!
//! Run `telemetry-agent` to export the agent's own counters with defaults;
//! applications embed [`crate::export::Agent`] to export their metrics.

use crate::core::config::ConfigBuilder;
use crate::core::{Config, Result, TelemetryError};
use crate::export::{Agent, HttpTransport, LineProtocolSink};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Periodically exports metrics to InfluxDB, spilling to disk when it is down
#[derive(Parser, Debug)]
#[command(name = "telemetry-agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/telemetry/config.yaml)
    #[arg(short, long, env = "TELEMETRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sink base URL
    #[arg(long, env = "TELEMETRY_URL")]
    pub url: Option<String>,

    /// Sink auth token
    #[arg(long, env = "TELEMETRY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Organization the buckets belong to
    #[arg(long, env = "TELEMETRY_ORG")]
    pub org: Option<String>,

    /// Gather and replay interval, e.g. `5s`
    #[arg(long, env = "TELEMETRY_INTERVAL", value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Directory for spilled batches
    #[arg(long, env = "TELEMETRY_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "TELEMETRY_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Run a single flush and replay cycle, then exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("telemetry").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/telemetry/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(TelemetryError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(url) = &self.url {
            builder = builder.url(url.as_str());
        }
        if let Some(token) = &self.token {
            builder = builder.token(token.as_str());
        }
        if let Some(org) = &self.org {
            builder = builder.organization(org.as_str());
        }
        if let Some(interval) = self.interval {
            builder = builder.interval(interval);
        }
        if let Some(dir) = &self.backup_dir {
            builder = builder.backup_dir(dir.clone());
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging. `--debug` wins over `RUST_LOG`, which wins over
    /// the configured level.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(config.logging.structured)
            .with_thread_ids(config.logging.structured)
            .with_line_number(config.logging.structured)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the telemetry agent.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Sink URL: {}", config.sink.url);
        println!("  Organization: {}", config.sink.organization);
        println!("  Interval: {:?}", config.agent.interval);
        println!("  Retry attempts: {}", config.agent.retry_attempts);
        println!("  Backup dir: {}", config.agent.backup_dir.display());
        return Ok(());
    }

    cli.init_logging(&config)?;

    let transport = HttpTransport::new(&config.sink)?;
    let sink = LineProtocolSink::new(transport, config.sink.batch_size, config.retry.clone());
    let mut agent = Agent::new(config, Arc::new(sink))?;

    if cli.once {
        return run_once(&mut agent).await;
    }

    agent.start()?;
    tracing::info!("Telemetry agent running, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Received shutdown signal, stopping...");

    agent.stop().await
}

async fn run_once(agent: &mut Agent) -> Result<()> {
    let flushed = agent.flush_once(Utc::now()).await?;
    tracing::info!(
        buckets = flushed.buckets,
        points = flushed.points,
        failed_buckets = flushed.failed_buckets,
        "Flush cycle complete"
    );

    let replayed = agent.replay_once().await?;
    tracing::info!(
        files = replayed.files,
        records = replayed.records,
        failed_files = replayed.failed_files,
        "Replay cycle complete"
    );

    agent.stop().await
}

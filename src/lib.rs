//! Telemetry - lock-free in-process metrics with a resilient export agent.
//!
//! Application code updates atomic accumulators ("items"), optionally
//! partitioned by dynamic tag values. An [`export::Agent`] periodically
//! gathers every registered collector and writes the records to a
//! time-series sink, retrying failed batches, spilling them to disk once
//! retries run out and replaying the spilled data later.
//!
//! # Architecture
//!
//! - `metrics`: descriptors, items, item vectors and the `Collector` trait
//! - `registry`: collector set and the gather fan-in
//! - `export`: bucketing, sinks, backup store and the agent
//! - `core`: configuration, errors and retry policy
//! - `cli`: command-line interface of the `telemetry-agent` binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use telemetry_lib::core::Config;
//! use telemetry_lib::export::{Agent, HttpTransport, LineProtocolSink};
//! use telemetry_lib::metrics::{ItemOpts, ItemVec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let transport = HttpTransport::new(&config.sink)?;
//!     let sink = LineProtocolSink::new(transport, config.sink.batch_size, config.retry.clone());
//!
//!     let disk = ItemVec::new(ItemOpts::new("system", "disk", "disk_usage"), ["disk_path"])?;
//!     let mut agent = Agent::new(config, Arc::new(sink))?;
//!     agent.register(disk.clone());
//!     agent.start()?;
//!
//!     disk.with_tag_values(&["/"]).add(1024.0);
//!
//!     agent.stop().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod core;
pub mod export;
pub mod metrics;
pub mod registry;

// Re-export core types for convenience
pub use crate::core::{Config, Result};

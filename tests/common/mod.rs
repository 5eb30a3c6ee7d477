//! Common test utilities and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry_lib::core::{Config, ConfigBuilder, Result, RetryConfig, TelemetryError};
use telemetry_lib::export::{Agent, LineProtocolSink, Transport};
use telemetry_lib::metrics::{ConstraintTags, Item, ItemOpts, ItemVec};

/// One request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub organization: String,
    pub bucket: String,
    pub body: String,
}

/// In-memory transport that records every batch and can be switched into a
/// failing state. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    failing: AtomicBool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<Sent>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::new();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Every send, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.sent.lock().clone()
    }

    /// Successfully sent lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.state
            .sent
            .lock()
            .iter()
            .flat_map(|sent| sent.body.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, organization: &str, bucket: &str, body: String) -> Result<()> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(TelemetryError::sink("sink unavailable"));
        }
        self.state.sent.lock().push(Sent {
            organization: organization.to_string(),
            bucket: bucket.to_string(),
            body,
        });
        Ok(())
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Sink over `transport` with no backoff between retries.
pub fn sink(transport: &MockTransport) -> Arc<LineProtocolSink<MockTransport>> {
    Arc::new(LineProtocolSink::new(
        transport.clone(),
        100,
        RetryConfig::immediate(),
    ))
}

pub fn config(backup_dir: &Path, retry_attempts: u32) -> Config {
    ConfigBuilder::new()
        .organization("test-org")
        .interval(Duration::from_millis(50))
        .retry_attempts(retry_attempts)
        .backup_dir(backup_dir.to_path_buf())
        .retry(RetryConfig::immediate())
        .self_metrics(false)
        .build()
        .unwrap()
}

pub fn agent(config: Config, transport: &MockTransport) -> Agent {
    Agent::new(config, sink(transport)).unwrap()
}

fn constraint() -> ConstraintTags {
    ConstraintTags::new(["env", "version"], ["production", "v1.0"])
}

pub fn memory_usage() -> Item {
    Item::new(
        ItemOpts::new("system", "resource", "memory_usage")
            .description("Tracks the memory usage of the system.")
            .constraint_tags(constraint()),
    )
    .unwrap()
}

pub fn disk_usage() -> ItemVec {
    ItemVec::new(
        ItemOpts::new("system", "disk", "disk_usage")
            .description("Tracks the disk usage of the system.")
            .constraint_tags(constraint()),
        ["disk_path"],
    )
    .unwrap()
}

pub fn queue_depth() -> ItemVec {
    ItemVec::new(ItemOpts::new("app", "queue", "depth"), ["queue"]).unwrap()
}

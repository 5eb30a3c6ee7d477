//! Export agent: periodic flush and replay tasks over one registry.
//!
//! ```text
//!  flush task:  tick -> gather -> Bucket -> writer per bucket -> flush
//!                                               | batch fails
//!                                               v
//!                               SpillHandler: retry ... -> <bucket>.txt
//!  replay task: tick -> list backup_dir -> claim -> writer per file -> flush -> delete
//! ```
//!
//! Both tasks stop on a shared watch signal. A cycle that has started always
//! runs to completion.

use crate::core::{Config, Result, TelemetryError};
use crate::export::backup::{self, Exhausted, SpillHandler};
use crate::export::bucket::Bucket;
use crate::export::sink::Sink;
use crate::export::stats::AgentStats;
use crate::metrics::Collector;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{Instrument, Span};

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub buckets: usize,
    pub points: usize,
    pub skipped: usize,
    /// Buckets with at least one batch that was spilled instead of written
    pub failed_buckets: usize,
}

/// Outcome of one replay cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub files: usize,
    pub records: usize,
    /// Files whose flush did not fully succeed; they are deleted regardless
    pub failed_files: usize,
}

struct AgentInner {
    registry: Registry,
    sink: Arc<dyn Sink>,
    config: Config,
    stats: AgentStats,
    span: Span,
}

/// Periodically exports every registered collector to a [`Sink`].
pub struct Agent {
    inner: Arc<AgentInner>,
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
    closed: bool,
}

impl Agent {
    /// Build an agent over `sink`. The agent's own counters are registered
    /// when `agent.self_metrics` is set.
    pub fn new(config: Config, sink: Arc<dyn Sink>) -> Result<Self> {
        let span = tracing::info_span!("telemetry_agent", org = %config.sink.organization);
        Self::with_span(config, sink, span)
    }

    /// Like [`Agent::new`], logging inside `span`.
    pub fn with_span(config: Config, sink: Arc<dyn Sink>, span: Span) -> Result<Self> {
        config.validate()?;
        let stats = AgentStats::new()?;
        let registry = Registry::new();
        if config.agent.self_metrics {
            registry.register(stats.clone());
        }

        Ok(Self {
            inner: Arc::new(AgentInner {
                registry,
                sink,
                config,
                stats,
                span,
            }),
            shutdown: None,
            handles: Vec::new(),
            closed: false,
        })
    }

    pub fn register<C: Collector + 'static>(&self, collector: C) {
        self.inner.registry.register(collector);
    }

    pub fn registers<I>(&self, collectors: I)
    where
        I: IntoIterator<Item = Arc<dyn Collector>>,
    {
        self.inner.registry.registers(collectors);
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn stats(&self) -> &AgentStats {
        &self.inner.stats
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawn the flush and replay tasks. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.shutdown.is_some() {
            return Err(TelemetryError::AlreadyStarted);
        }
        if self.closed {
            return Err(TelemetryError::sink("agent was stopped and its sink closed"));
        }

        let (tx, rx) = watch::channel(false);
        let period = self.inner.config.agent.interval;
        let span = self.inner.span.clone();

        let inner = Arc::clone(&self.inner);
        let flush = tokio::spawn(
            run_periodic(period, rx.clone(), move || {
                let inner = Arc::clone(&inner);
                async move {
                    if let Err(err) = inner.flush_once(Utc::now()).await {
                        tracing::error!(error = %err, "Flush cycle failed");
                    }
                }
            })
            .instrument(tracing::info_span!(parent: &span, "flush")),
        );

        let inner = Arc::clone(&self.inner);
        let replay = tokio::spawn(
            run_periodic(period, rx, move || {
                let inner = Arc::clone(&inner);
                async move {
                    if let Err(err) = inner.replay_once().await {
                        tracing::error!(error = %err, "Replay cycle failed");
                    }
                }
            })
            .instrument(tracing::info_span!(parent: &span, "replay")),
        );

        self.shutdown = Some(tx);
        self.handles = vec![flush, replay];
        span.in_scope(|| tracing::info!(interval = ?period, "Telemetry agent started"));
        Ok(())
    }

    /// Signal both tasks, wait for them to exit, then close the sink.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }

        let mut result = Ok(());
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                result = Err(TelemetryError::from(err));
            }
        }

        if !self.closed {
            self.closed = true;
            self.inner.sink.close().await;
            self.inner
                .span
                .in_scope(|| tracing::info!("Telemetry agent stopped"));
        }
        result
    }

    /// Run one gather and flush cycle stamped with `now`.
    pub async fn flush_once(&self, now: DateTime<Utc>) -> Result<FlushSummary> {
        self.inner
            .flush_once(now)
            .instrument(self.inner.span.clone())
            .await
    }

    /// Run one replay cycle over the backup directory.
    pub async fn replay_once(&self) -> Result<ReplaySummary> {
        self.inner
            .replay_once()
            .instrument(self.inner.span.clone())
            .await
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

/// Tick every `period` (first tick one period from now) until `shutdown`
/// flips or its sender goes away.
async fn run_periodic<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => cycle().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("Shutting down");
                    break;
                }
            },
        }
    }
}

impl AgentInner {
    async fn flush_once(self: &Arc<Self>, now: DateTime<Utc>) -> Result<FlushSummary> {
        let inner = Arc::clone(self);
        let span = Span::current();
        let bucket = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            let mut bucket = Bucket::new();
            for metric in inner.registry.gather() {
                bucket.add(metric.as_ref(), now);
            }
            bucket
        })
        .await?;

        self.stats.gather_cycles.inc();
        self.stats.skipped_records.add(count(bucket.skipped()));
        bucket.summary(now);

        let mut summary = FlushSummary {
            buckets: bucket.len(),
            points: bucket.point_count(),
            skipped: bucket.skipped(),
            failed_buckets: 0,
        };

        let organization = &self.config.sink.organization;
        for (key, points) in bucket {
            let name = key.name();
            let mut writer = self.sink.writer(organization, &name);
            writer.set_failure_callback(
                SpillHandler::new(
                    name.as_str(),
                    self.config.agent.backup_dir.as_path(),
                    self.config.agent.retry_attempts,
                    now,
                )
                .with_span(self.span.clone())
                .with_stats(self.stats.clone())
                .into_callback(),
            );

            for point in &points {
                writer.write_point(point);
            }

            match writer.flush().await {
                Ok(()) => self.stats.points_written.add(count(points.len())),
                Err(err) => {
                    summary.failed_buckets += 1;
                    tracing::warn!(bucket = %name, error = %err, "Flush incomplete");
                },
            }
        }

        if self.config.agent.clear_value {
            self.registry.evict_idle_collectors();
        }
        Ok(summary)
    }

    async fn replay_once(&self) -> Result<ReplaySummary> {
        let backup_dir = self.config.agent.backup_dir.as_path();
        let files = match backup::list_backup_files(backup_dir).await {
            Ok(files) => files,
            Err(TelemetryError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %backup_dir.display(), "No backup directory yet");
                return Ok(ReplaySummary::default());
            },
            Err(err) => return Err(err),
        };

        let mut summary = ReplaySummary::default();
        for file in files {
            let path = match file.claim() {
                Ok(path) => path,
                Err(err) => {
                    tracing::error!(path = %file.path.display(), error = %err, "Failed to claim backup file");
                    continue;
                },
            };

            let records = match backup::read_records(&path).await {
                Ok(records) => records,
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err, "Failed to read backup file");
                    continue;
                },
            };

            let mut writer = self.sink.writer(&self.config.sink.organization, &file.bucket);
            writer.set_failure_callback(
                SpillHandler::new(
                    file.bucket.as_str(),
                    backup_dir,
                    self.config.agent.retry_attempts,
                    Utc::now(),
                )
                .on_exhausted(Exhausted::Drop)
                .with_span(self.span.clone())
                .into_callback(),
            );

            for record in &records {
                writer.write_record(record);
            }

            match writer.flush().await {
                Ok(()) => self.stats.replayed_records.add(count(records.len())),
                Err(err) => {
                    summary.failed_files += 1;
                    tracing::warn!(
                        bucket = %file.bucket,
                        error = %err,
                        "Replay incomplete, removing backup file anyway"
                    );
                },
            }

            if let Err(err) = tokio::fs::remove_file(&path).await {
                tracing::error!(path = %path.display(), error = %err, "Failed to remove backup file");
            }

            tracing::info!(bucket = %file.bucket, records = records.len(), "Replayed backup file");
            summary.files += 1;
            summary.records += records.len();
            self.stats.replay_files.inc();
        }
        Ok(summary)
    }
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> f64 {
    n as f64
}

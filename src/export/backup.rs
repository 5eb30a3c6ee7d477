//! Local backup store for batches the sink would not take.
//!
//! One file per destination bucket, `<backup_dir>/<bucket>.txt`, holding
//! newline-delimited line-protocol records. The flush path appends to it.
//! Replay first claims it by renaming it to `<bucket>.<nanos>.replaying`,
//! then reads and deletes the claimed copy, so batches spilled meanwhile
//! land in a fresh `<bucket>.txt` for the next cycle. Spilling and claiming
//! take the same lock.

use crate::core::{Result, TelemetryError};
use crate::export::sink::FailureCallback;
use crate::export::stats::AgentStats;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::Span;

const EXTENSION: &str = "txt";

/// Extension of a file taken over by a replay cycle.
const CLAIMED_EXTENSION: &str = "replaying";

/// Held while appending to or renaming a backup file.
static FILE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Run small synchronous file I/O, moving off the async worker when the
/// runtime allows it.
fn blocking_io<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        },
        _ => f(),
    }
}

/// Path of the backup file for `bucket`.
pub fn backup_path(backup_dir: &Path, bucket: &str) -> PathBuf {
    backup_dir.join(format!("{}.{}", bucket, EXTENSION))
}

/// What happens to a batch once its retries are used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// Append it to the bucket's backup file.
    Spill,
    /// Log it as lost. Used by replay, whose source file is deleted anyway.
    Drop,
}

/// Failure callback for one bucket writer.
///
/// While fewer than `retry_attempts` retries have been made the batch is
/// logged and retried; after that it is spilled (or dropped) and the writer
/// is told to stop.
pub struct SpillHandler {
    bucket: String,
    backup_dir: PathBuf,
    retry_attempts: u32,
    now: DateTime<Utc>,
    exhausted: Exhausted,
    span: Span,
    stats: Option<AgentStats>,
}

impl SpillHandler {
    pub fn new(
        bucket: impl Into<String>,
        backup_dir: impl Into<PathBuf>,
        retry_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            backup_dir: backup_dir.into(),
            retry_attempts,
            now,
            exhausted: Exhausted::Spill,
            span: Span::current(),
            stats: None,
        }
    }

    pub fn on_exhausted(mut self, exhausted: Exhausted) -> Self {
        self.exhausted = exhausted;
        self
    }

    /// Log inside `span` instead of the span current at construction.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_stats(mut self, stats: AgentStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Decide the fate of a failed batch. Returns `true` to retry it.
    pub fn on_failure(&mut self, batch: &str, err: &TelemetryError, attempts: u32) -> bool {
        let _guard = self.span.enter();

        if attempts < self.retry_attempts {
            tracing::error!(
                bucket = %self.bucket,
                time = %self.now.to_rfc3339_opts(SecondsFormat::Secs, true),
                error = %err,
                attempts = %format_args!("{}/{}", attempts, self.retry_attempts),
                batch,
                "Sink write failed, retrying"
            );
            return true;
        }

        match self.exhausted {
            Exhausted::Spill => match self.spill(batch) {
                Ok(path) => {
                    tracing::warn!(
                        bucket = %self.bucket,
                        path = %path.display(),
                        error = %err,
                        "Retries exhausted, batch spilled to backup store"
                    );
                    if let Some(stats) = &self.stats {
                        stats.spilled_batches.inc();
                    }
                },
                Err(spill_err) => {
                    tracing::error!(
                        bucket = %self.bucket,
                        error = %spill_err,
                        batch,
                        "Failed to spill batch, data lost"
                    );
                },
            },
            Exhausted::Drop => {
                tracing::error!(
                    bucket = %self.bucket,
                    error = %err,
                    batch,
                    "Retries exhausted during replay, batch dropped"
                );
            },
        }
        false
    }

    /// Append `batch` to this bucket's backup file, creating it if needed.
    ///
    /// Runs on the calling thread; on a multi-thread runtime the worker is
    /// handed off first via `block_in_place`.
    pub fn spill(&self, batch: &str) -> Result<PathBuf> {
        blocking_io(|| {
            std::fs::create_dir_all(&self.backup_dir).map_err(|e| {
                TelemetryError::backup(format!(
                    "cannot create backup directory {}: {}",
                    self.backup_dir.display(),
                    e
                ))
            })?;

            let path = backup_path(&self.backup_dir, &self.bucket);
            let _lock = FILE_LOCK.lock();
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(batch.as_bytes())?;
            if !batch.ends_with('\n') {
                file.write_all(b"\n")?;
            }
            Ok(path)
        })
    }

    pub fn into_callback(mut self) -> FailureCallback {
        Box::new(move |batch, err, attempts| self.on_failure(batch, err, attempts))
    }
}

/// A backup file found by [`list_backup_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub bucket: String,
    pub path: PathBuf,
}

impl BackupFile {
    /// True for a file already renamed by a replay cycle.
    pub fn is_claimed(&self) -> bool {
        self.path.extension().and_then(|ext| ext.to_str()) == Some(CLAIMED_EXTENSION)
    }

    /// Take the file over for replay by renaming it out of the spill path.
    ///
    /// Returns the path to read and delete. A file left claimed by an
    /// interrupted cycle is returned as is.
    pub fn claim(&self) -> Result<PathBuf> {
        if self.is_claimed() {
            return Ok(self.path.clone());
        }

        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let claimed = self
            .path
            .with_file_name(format!("{}.{}.{}", self.bucket, nanos, CLAIMED_EXTENSION));
        blocking_io(|| {
            let _lock = FILE_LOCK.lock();
            std::fs::rename(&self.path, &claimed)
        })?;
        Ok(claimed)
    }
}

/// Bucket named by a backup file: `<bucket>.txt`, or
/// `<bucket>.<nanos>.replaying` for a claimed one.
fn bucket_of(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    let bucket = match path.extension()?.to_str()? {
        EXTENSION => stem,
        CLAIMED_EXTENSION => {
            let (bucket, nanos) = stem.rsplit_once('.')?;
            if nanos.is_empty() || !nanos.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            bucket
        },
        _ => return None,
    };
    (!bucket.is_empty()).then_some(bucket)
}

/// Regular backup files under `backup_dir`, sorted by bucket name: every
/// `*.txt` file plus claimed files an interrupted replay left behind.
///
/// Directories and other files are skipped. A missing directory is an
/// `Io` error of kind `NotFound`.
pub async fn list_backup_files(backup_dir: &Path) -> Result<Vec<BackupFile>> {
    let mut entries = tokio::fs::read_dir(backup_dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }

        match bucket_of(&path) {
            Some(bucket) => files.push(BackupFile {
                bucket: bucket.to_string(),
                path,
            }),
            None => tracing::debug!(path = %path.display(), "Ignoring non-backup file"),
        }
    }

    files.sort_by(|a, b| a.bucket.cmp(&b.bucket).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

/// Non-empty lines of a backup file.
pub async fn read_records(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn handler(dir: &Path, retries: u32) -> SpillHandler {
        SpillHandler::new("disk", dir, retries, Utc::now())
    }

    #[test]
    fn test_retries_then_spills() {
        let dir = TempDir::new().unwrap();
        let mut handler = handler(dir.path(), 2);
        let err = TelemetryError::sink("connection refused");

        assert!(handler.on_failure("disk value=1.0 1", &err, 0));
        assert!(handler.on_failure("disk value=1.0 1", &err, 1));
        assert!(!backup_path(dir.path(), "disk").exists());

        assert!(!handler.on_failure("disk value=1.0 1", &err, 2));
        let content = std::fs::read_to_string(dir.path().join("disk.txt")).unwrap();
        assert_eq!(content, "disk value=1.0 1\n");
    }

    #[test]
    fn test_spill_appends_and_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let handler = handler(&nested, 0);

        handler.spill("m value=1.0 1\nm value=2.0 2").unwrap();
        handler.spill("m value=3.0 3\n").unwrap();

        let content = std::fs::read_to_string(backup_path(&nested, "disk")).unwrap();
        assert_eq!(content, "m value=1.0 1\nm value=2.0 2\nm value=3.0 3\n");
    }

    #[test]
    fn test_spill_counts_in_stats() {
        let dir = TempDir::new().unwrap();
        let stats = AgentStats::new().unwrap();
        let mut callback = handler(dir.path(), 0).with_stats(stats.clone()).into_callback();

        assert!(!callback("m value=1.0 1", &TelemetryError::sink("down"), 0));
        assert_eq!(stats.spilled_batches.value(), 1.0);
    }

    #[test]
    fn test_drop_mode_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut handler = handler(dir.path(), 0).on_exhausted(Exhausted::Drop);

        assert!(!handler.on_failure("m value=1.0 1", &TelemetryError::sink("down"), 0));
        assert!(!backup_path(dir.path(), "disk").exists());
    }

    #[tokio::test]
    async fn test_list_and_read() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("REALTIME_system.txt"), "a v=1\n\nb v=2\n").unwrap();
        std::fs::write(dir.path().join("disk.txt"), "c v=3").unwrap();
        std::fs::write(dir.path().join("notes.log"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let files = list_backup_files(dir.path()).await.unwrap();
        let buckets: Vec<&str> = files.iter().map(|f| f.bucket.as_str()).collect();
        assert_eq!(buckets, vec!["REALTIME_system", "disk"]);

        let records = read_records(&files[0].path).await.unwrap();
        assert_eq!(records, vec!["a v=1", "b v=2"]);
    }

    #[tokio::test]
    async fn test_claim_moves_file_out_of_spill_path() {
        let dir = TempDir::new().unwrap();
        let handler = handler(dir.path(), 0);
        handler.spill("disk value=1.0 1").unwrap();

        let files = list_backup_files(dir.path()).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].is_claimed());
        let claimed = files[0].claim().unwrap();
        assert!(!backup_path(dir.path(), "disk").exists());

        handler.spill("disk value=2.0 2").unwrap();
        assert_eq!(read_records(&claimed).await.unwrap(), vec!["disk value=1.0 1"]);
        assert_eq!(
            std::fs::read_to_string(backup_path(dir.path(), "disk")).unwrap(),
            "disk value=2.0 2\n"
        );
    }

    #[tokio::test]
    async fn test_leftover_claimed_files_are_listed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("REALTIME_disk.1700000000.replaying"), "a v=1\n").unwrap();
        std::fs::write(dir.path().join("REALTIME_disk.txt"), "b v=2\n").unwrap();
        std::fs::write(dir.path().join("REALTIME_disk.replaying"), "ignored").unwrap();

        let files = list_backup_files(dir.path()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.bucket == "REALTIME_disk"));

        let leftover = files.iter().find(|f| f.is_claimed()).unwrap();
        assert_eq!(leftover.claim().unwrap(), leftover.path);
    }

    #[test]
    fn test_spill_on_multi_thread_runtime() {
        let dir = TempDir::new().unwrap();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let backup_dir = dir.path().to_path_buf();
        let path = runtime
            .block_on(tokio::spawn(async move {
                handler(&backup_dir, 0).spill("m value=1.0 1")
            }))
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "m value=1.0 1\n");
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = list_backup_files(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}

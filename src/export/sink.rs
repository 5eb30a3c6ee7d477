//! Sink abstraction and the batching writer shared by every transport.
//!
//! A [`Sink`] hands out one [`SinkWriter`] per `(organization, bucket)`.
//! Writers buffer encoded lines and push them in batches on `flush`; when a
//! batch fails the attached [`FailureCallback`] decides whether it is sent
//! again.

use crate::core::{Result, RetryConfig, TelemetryError};
use crate::export::point::Point;
use async_trait::async_trait;
use std::sync::Arc;

/// Called with `(batch, error, attempts)` when a batch fails, `attempts`
/// being the number of retries already made for that batch. Returning
/// `true` asks for another attempt.
pub type FailureCallback = Box<dyn FnMut(&str, &TelemetryError, u32) -> bool + Send>;

/// Buffered writer bound to one destination bucket.
#[async_trait]
pub trait SinkWriter: Send {
    fn set_failure_callback(&mut self, callback: FailureCallback);

    fn write_point(&mut self, point: &Point);

    /// Queue one pre-encoded line-protocol record.
    fn write_record(&mut self, record: &str);

    /// Send everything buffered. Fails if any batch was given up on.
    async fn flush(&mut self) -> Result<()>;
}

/// Connection to a remote time-series store.
#[async_trait]
pub trait Sink: Send + Sync {
    fn writer(&self, organization: &str, bucket: &str) -> Box<dyn SinkWriter>;

    async fn close(&self);
}

/// Delivers one encoded batch to the remote store.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, organization: &str, bucket: &str, body: String) -> Result<()>;

    async fn close(&self) {}
}

/// [`SinkWriter`] that batches lines over a [`Transport`] and drives the
/// retry loop.
pub struct BatchWriter<T> {
    transport: Arc<T>,
    organization: String,
    bucket: String,
    batch_size: usize,
    retry: RetryConfig,
    lines: Vec<String>,
    callback: Option<FailureCallback>,
}

impl<T: Transport> BatchWriter<T> {
    pub fn new(
        transport: Arc<T>,
        organization: impl Into<String>,
        bucket: impl Into<String>,
        batch_size: usize,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            organization: organization.into(),
            bucket: bucket.into(),
            batch_size: batch_size.max(1),
            retry,
            lines: Vec::new(),
            callback: None,
        }
    }

    pub fn buffered(&self) -> usize {
        self.lines.len()
    }

    async fn send_batch(&mut self, body: String) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            let err = match self
                .transport
                .send(&self.organization, &self.bucket, body.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let retry = match self.callback.as_mut() {
                Some(callback) => callback(&body, &err, attempts),
                None => false,
            };
            if !retry {
                return Err(err);
            }

            tokio::time::sleep(self.retry.backoff(attempts)).await;
            attempts = attempts.saturating_add(1);
        }
    }
}

#[async_trait]
impl<T: Transport> SinkWriter for BatchWriter<T> {
    fn set_failure_callback(&mut self, callback: FailureCallback) {
        self.callback = Some(callback);
    }

    fn write_point(&mut self, point: &Point) {
        self.lines.push(point.to_line_protocol());
    }

    fn write_record(&mut self, record: &str) {
        self.lines.push(record.to_string());
    }

    async fn flush(&mut self) -> Result<()> {
        let lines = std::mem::take(&mut self.lines);
        let batches: Vec<String> = lines
            .chunks(self.batch_size)
            .map(|chunk| chunk.join("\n"))
            .collect();
        let total = batches.len();

        let mut failed = 0usize;
        let mut last_error = None;
        for body in batches {
            if let Err(err) = self.send_batch(body).await {
                failed += 1;
                last_error = Some(err);
            }
        }

        match last_error {
            None => Ok(()),
            Some(err) => Err(TelemetryError::sink(format!(
                "{} of {} batches to bucket {} were not written: {}",
                failed, total, self.bucket, err
            ))),
        }
    }
}

/// [`Sink`] writing InfluxDB line protocol through a [`Transport`].
pub struct LineProtocolSink<T> {
    transport: Arc<T>,
    batch_size: usize,
    retry: RetryConfig,
}

impl<T: Transport> LineProtocolSink<T> {
    pub fn new(transport: T, batch_size: usize, retry: RetryConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            batch_size,
            retry,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

#[async_trait]
impl<T: Transport> Sink for LineProtocolSink<T> {
    fn writer(&self, organization: &str, bucket: &str) -> Box<dyn SinkWriter> {
        Box::new(BatchWriter::new(
            Arc::clone(&self.transport),
            organization,
            bucket,
            self.batch_size,
            self.retry.clone(),
        ))
    }

    async fn close(&self) {
        self.transport.close().await;
    }
}

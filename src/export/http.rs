//! InfluxDB v2 HTTP write transport.

use crate::core::{Result, SinkConfig, TelemetryError};
use crate::export::sink::Transport;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

/// POSTs line-protocol batches to `<url>/api/v2/write`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    write_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("telemetry-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, organization: &str, bucket: &str, body: String) -> Result<()> {
        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[("org", organization), ("bucket", bucket), ("precision", "ns")])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if !self.token.is_empty() {
            request = request.header(AUTHORIZATION, format!("Token {}", self.token));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(TelemetryError::sink(format!(
            "write to bucket {} failed with status {}: {}",
            bucket,
            status,
            message.trim()
        )))
    }
}

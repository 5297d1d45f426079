//! HTTP acquisition: page fetches and streamed downloads.
//!
//! Every request carries a browser-like `User-Agent` and is bounded by the
//! configured timeout. Non-2xx responses are [`IngestError::FetchFailure`].

use std::io::Write;
use std::time::Duration;

use crate::error::{IngestError, IngestResult};

/// Thin wrapper around a configured `reqwest::Client`.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout_secs: u64) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IngestError::Setup(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// GETs `url` and returns the body as text.
    pub async fn get_text(&self, url: &str) -> IngestResult<String> {
        let response = self.get_ok(url).await?;
        response.text().await.map_err(|e| fetch_failure(url, e))
    }

    /// GETs `url` and streams the body into `sink` chunk by chunk.
    ///
    /// Returns the number of bytes written.
    pub async fn download_to<W: Write>(&self, url: &str, sink: &mut W) -> IngestResult<u64> {
        let mut response = self.get_ok(url).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| fetch_failure(url, e))? {
            sink.write_all(&chunk).map_err(|e| IngestError::FetchFailure {
                url: url.to_string(),
                reason: format!("writing download: {}", e),
            })?;
            written += chunk.len() as u64;
        }
        sink.flush().map_err(|e| IngestError::FetchFailure {
            url: url.to_string(),
            reason: format!("flushing download: {}", e),
        })?;
        tracing::debug!(url, bytes = written, "download complete");
        Ok(written)
    }

    async fn get_ok(&self, url: &str) -> IngestResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_failure(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::FetchFailure {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        Ok(response)
    }
}

fn fetch_failure(url: &str, err: reqwest::Error) -> IngestError {
    let reason = if err.is_timeout() {
        format!("timed out: {}", err)
    } else {
        err.to_string()
    };
    IngestError::FetchFailure {
        url: url.to_string(),
        reason,
    }
}

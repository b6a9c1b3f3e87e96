//! Remote document retrieval.
//!
//! [`DocSource`] is the seam between the search core and the network. The
//! production implementation, [`HttpSource`], wraps a pooled reqwest client;
//! tests substitute `MemorySource`, available with the `test-util` feature.
//! [`RetryPolicy`] layers exponential backoff over any source.

use crate::config::{HttpConfig, RetryConfig};
use crate::error::FetchError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;

#[cfg(any(test, feature = "test-util"))]
mod memory;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemorySource;

/// Something that can return the JSON body found at a URL.
pub trait DocSource: Send + Sync {
    fn fetch_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value, FetchError>>;
}

/// [`DocSource`] backed by a shared reqwest client.
///
/// reqwest pools connections per host, so one client is reused for the manifest
/// probe, manifest refreshes, and every corpus download of a site.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { client })
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

impl DocSource for HttpSource {
    fn fetch_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value, FetchError>> {
        Box::pin(self.get_json(url))
    }
}

/// Exponential backoff for remote fetches.
///
/// Attempt `n` (1-based) that fails with a retryable error waits
/// `base_delay * 2^(n-1)` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay inserted after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Fetch `url`, retrying transient failures. Returns the last error once
    /// attempts are exhausted or a terminal error is seen.
    pub async fn fetch_json(&self, source: &dyn DocSource, url: &str) -> Result<Value, FetchError> {
        let mut attempt = 1;
        loop {
            match source.fetch_json(url).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        "Fetch of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        url,
                        attempt,
                        self.attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

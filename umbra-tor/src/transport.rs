//! Rate-limited, retrying page fetches
//!
//! A fetch waits for rate-limit admission once, then makes up to
//! `max_retries` attempts. Network failures and 408/429/5xx responses are
//! retried with exponential backoff; any other non-2xx status ends the
//! fetch immediately.

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::proxy::{create_tor_client, TorConfig, TorError};
use crate::rate_limit::RateLimiter;

/// Failed fetch
///
/// `status` is 0 when no HTTP response was received.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport error: {url} (attempt {attempt}, status {status}): {cause}")]
pub struct TransportError {
    pub url: String,
    pub attempt: u32,
    pub status: u16,
    pub cause: String,
    pub retryable: bool,
}

impl TransportError {
    pub fn new(url: &str, attempt: u32, status: u16, cause: impl Into<String>, retryable: bool) -> Self {
        Self {
            url: url.to_string(),
            attempt,
            status,
            cause: cause.into(),
            retryable,
        }
    }
}

/// Statuses worth another attempt
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Backoff before the attempt after `attempt`: 2^attempt seconds, capped
pub fn backoff_for(attempt: u32, max: Duration) -> Duration {
    let secs = 2u64.saturating_pow(attempt);
    Duration::from_secs(secs).min(max)
}

/// Page fetching capability
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a URL, returning only 2xx responses
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> Result<Response, TransportError>;
}

/// Tor-routed [`Fetcher`]
#[derive(Debug)]
pub struct TorClient {
    client: Client,
    limiter: RateLimiter,
    config: TorConfig,
}

impl TorClient {
    pub fn new(config: TorConfig) -> Result<Self, TorError> {
        let client = create_tor_client(&config)?;
        let limiter = RateLimiter::new(config.rate_limit_rps, config.max_jitter);

        Ok(Self {
            client,
            limiter,
            config,
        })
    }

    pub fn config(&self) -> &TorConfig {
        &self.config
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<Response, TransportError> {
        let request = self
            .client
            .get(url)
            .build()
            .map_err(|e| TransportError::new(url, attempt, 0, e.to_string(), false))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| TransportError::new(url, attempt, 0, e.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                url,
                attempt,
                status.as_u16(),
                format!("HTTP {status}"),
                is_retryable_status(status.as_u16()),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl Fetcher for TorClient {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> Result<Response, TransportError> {
        self.limiter
            .wait(cancel)
            .await
            .map_err(|e| TransportError::new(url, 0, 0, e.to_string(), false))?;

        let max_retries = self.config.max_retries;
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=max_retries {
            debug!("Fetching {} (attempt {}/{})", url, attempt, max_retries);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TransportError::new(url, attempt, 0, "fetch cancelled", false));
                }
                result = self.attempt(url, attempt) => result,
            };

            let err = match result {
                Ok(response) => {
                    debug!("Fetched {} on attempt {}", url, attempt);
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !err.retryable {
                error!("Non-retryable error for {}: {}", url, err);
                return Err(err);
            }

            warn!("Attempt {} for {} failed, will retry: {}", attempt, url, err);
            last_error = err.to_string();

            if attempt < max_retries {
                let backoff = backoff_for(attempt, self.config.max_backoff);
                debug!("Backing off {:?} before attempt {}", backoff, attempt + 1);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(TransportError::new(url, attempt, 0, "fetch cancelled", false));
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        error!("Max retries ({}) reached for {}", max_retries, url);
        Err(TransportError::new(
            url,
            max_retries,
            0,
            format!("max retries reached: {last_error}"),
            false,
        ))
    }
}

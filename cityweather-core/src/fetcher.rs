//! Resilient HTTP fetching with bounded exponential backoff.
//!
//! The fetcher is endpoint-agnostic: the resolver uses the same instance for
//! geocoding and for the one-call weather request. Failures never escape it;
//! after the last attempt the caller just gets `None`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::{fmt::Debug, sync::Arc, time::Duration};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("cityweather/", env!("CARGO_PKG_VERSION"));

/// One failed attempt. Retried by [`Fetcher::fetch`], never returned by it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("response body is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A single GET returning a JSON body.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, TransportError> {
        let res = self.http.get(url).query(query).send().await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status { status, body: truncate_body(&body) });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Attempt count and backoff schedule. No jitter, no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, initial_delay: DEFAULT_INITIAL_DELAY }
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), initial_delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `initial_delay * 2^attempt`, with `attempt` counted from zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// The sleeps between attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts - 1).map(|attempt| self.delay_for_attempt(attempt))
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    api_key: String,
    retry: RetryPolicy,
}

impl Fetcher {
    /// Fetcher backed by a real HTTP client and the default retry policy.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new()?), api_key))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, api_key: impl Into<String>) -> Self {
        Self { transport, api_key: api_key.into(), retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// GET `url` with `params` plus the API key. Returns the parsed body of the
    /// first successful attempt, or `None` once every attempt has failed.
    pub async fn fetch(&self, url: &str, params: &[(&str, String)]) -> Option<Value> {
        let mut query: Vec<(String, String)> =
            params.iter().map(|(name, value)| ((*name).to_string(), value.clone())).collect();
        query.push(("appid".to_string(), self.api_key.clone()));

        let max_attempts = self.retry.max_attempts();

        for attempt in 0..max_attempts {
            match self.transport.get_json(url, &query).await {
                Ok(body) => {
                    if attempt > 0 {
                        tracing::info!(url, attempt = attempt + 1, "request succeeded after retrying");
                    }
                    return Some(body);
                }
                Err(error) if attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        url,
                        attempt = attempt + 1,
                        max_attempts,
                        ?delay,
                        %error,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::error!(url, attempts = max_attempts, %error, "giving up on request");
                }
            }
        }

        None
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

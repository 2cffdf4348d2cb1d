//! HTTP fetch utilities and LLM API clients for Hot Match.

pub mod llm;

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub use llm::{
    extract_json_object, AnthropicClient, CompletionRequest, LlmClient, LlmError, OpenAiClient,
};

pub const CRATE_NAME: &str = "hotmatch-fetch";

pub const DEFAULT_USER_AGENT: &str = "hotmatch/0.1 (+rss discovery)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Exponential delay, doubled per attempt and capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = u32::try_from(attempt_index)
            .ok()
            .and_then(|shift| 1u32.checked_shl(shift))
            .unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Requests allowed in flight at once across all feeds.
    pub max_in_flight: usize,
    /// Minimum gap between request starts.
    pub spacing: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            max_in_flight: 4,
            spacing: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Holds callers until `interval` has passed since the previous call started.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let start = match *next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next_slot = Some(start + self.interval);
        drop(next_slot);
        tokio::time::sleep_until(start).await;
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetcher is shutting down")]
    Closed,
}

impl FetchError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            Self::Request(err) => classify_reqwest_error(err),
            Self::HttpStatus { status, .. } => StatusCode::from_u16(*status)
                .map(classify_status)
                .unwrap_or(RetryDisposition::NonRetryable),
            Self::Closed => RetryDisposition::NonRetryable,
        }
    }
}

/// Feed and page downloader shared by a discovery run.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Semaphore,
    pacer: Option<RequestPacer>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build().context("building reqwest client")?,
            in_flight: Semaphore::new(config.max_in_flight.max(1)),
            pacer: config.spacing.map(RequestPacer::every),
            backoff: config.backoff,
        })
    }

    /// GET `url` as text, retrying 5xx, 429 and connection failures.
    pub async fn get_text(&self, run_id: Uuid, url: &str) -> Result<String, FetchError> {
        let _permit = self.in_flight.acquire().await.map_err(|_| FetchError::Closed)?;
        if let Some(pacer) = &self.pacer {
            pacer.wait().await;
        }
        let span = info_span!("feed_fetch", %run_id, url);
        self.get_with_retries(url).instrument(span).await
    }

    async fn get_with_retries(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            let err = match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp.text().await?),
                Ok(resp) => FetchError::HttpStatus {
                    status: resp.status().as_u16(),
                    url: resp.url().to_string(),
                },
                Err(err) => FetchError::Request(err),
            };
            if err.disposition() == RetryDisposition::NonRetryable || attempt >= self.backoff.max_retries {
                return Err(err);
            }
            let delay = self.backoff.delay_for_attempt(attempt);
            debug!(attempt, ?delay, error = %err, "retrying fetch");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_millis(350));
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
        let err = FetchError::HttpStatus {
            status: 503,
            url: "https://example.test/feed".into(),
        };
        assert_eq!(err.disposition(), RetryDisposition::Retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_consecutive_calls() {
        let pacer = RequestPacer::every(Duration::from_millis(1500));
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(10));
        pacer.wait().await;
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_does_not_bank_idle_time() {
        let pacer = RequestPacer::every(Duration::from_secs(2));
        pacer.wait().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        let resumed = Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        assert!(resumed.elapsed() >= Duration::from_secs(2));
    }
}

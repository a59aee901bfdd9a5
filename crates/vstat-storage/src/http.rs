use std::time::{Duration, Instant};

use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

/// Quota exhaustion surfaces as 403/429 on the metrics API and is never retried here.
pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
    pub pacing: Option<PacingConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
            pacing: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub interval: Duration,
    pub burst: u32,
}

impl PacingConfig {
    pub fn per_second(requests_per_sec: u32) -> Option<Self> {
        if requests_per_sec == 0 {
            return None;
        }
        Some(Self {
            interval: Duration::from_secs(1) / requests_per_sec,
            burst: requests_per_sec,
        })
    }
}

/// Generic cell rate pacing: each request books the next free slot, and a
/// caller only sleeps once the booked slot runs further ahead than the burst
/// tolerance allows.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    tolerance: Duration,
    next_slot: Mutex<Instant>,
}

impl RequestPacer {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            interval: config.interval,
            tolerance: config.interval.saturating_mul(config.burst.saturating_sub(1)),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub async fn wait_turn(&self) {
        let wait = {
            let now = Instant::now();
            let mut next_slot = self.next_slot.lock().await;
            let slot = (*next_slot).max(now);
            *next_slot = slot + self.interval;
            slot.saturating_duration_since(now).saturating_sub(self.tolerance)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// `path` excludes the query string so credentials never reach logs or errors.
    #[error("http status {status} for {path}")]
    HttpStatus { status: u16, path: String, body: String },
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    pacer: Option<RequestPacer>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
            pacer: config.pacing.map(RequestPacer::new),
            backoff: config.backoff,
        })
    }

    pub async fn fetch_bytes(&self, source_id: &str, url: &Url) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", source_id, path = url.path());
        self.fetch_with_retries(url).instrument(span).await
    }

    async fn fetch_with_retries(&self, url: &Url) -> Result<FetchedResponse, FetchError> {
        let mut attempt = 0usize;
        loop {
            if let Some(pacer) = &self.pacer {
                pacer.wait_turn().await;
            }

            let retry = match self.client.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        debug!(status = status.as_u16(), bytes = body.len(), "fetched");
                        return Ok(FetchedResponse { status, body });
                    }

                    let disposition = classify_status(status);
                    let body = resp.text().await.unwrap_or_default();
                    if disposition == RetryDisposition::NonRetryable || attempt >= self.backoff.max_retries {
                        return Err(FetchError::HttpStatus {
                            status: status.as_u16(),
                            path: url.path().to_string(),
                            body,
                        });
                    }
                    status.as_u16().to_string()
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::NonRetryable
                        || attempt >= self.backoff.max_retries
                    {
                        return Err(FetchError::Request(err));
                    }
                    err.to_string()
                }
            };

            let delay = self.backoff.delay_for_attempt(attempt);
            debug!(attempt, reason = %retry, ?delay, "retrying request");
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
    }

    #[test]
    fn quota_statuses_are_not_retried() {
        assert_eq!(classify_status(StatusCode::FORBIDDEN), RetryDisposition::NonRetryable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), RetryDisposition::NonRetryable);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RetryDisposition::Retryable);
    }

    #[test]
    fn pacing_config_from_rate() {
        assert!(PacingConfig::per_second(0).is_none());
        let config = PacingConfig::per_second(4).unwrap();
        assert_eq!(config.burst, 4);
        assert_eq!(config.interval, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn pacer_lets_the_burst_through_immediately() {
        let pacer = RequestPacer::new(PacingConfig {
            interval: Duration::from_secs(60),
            burst: 3,
        });
        let started = Instant::now();
        for _ in 0..3 {
            pacer.wait_turn().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

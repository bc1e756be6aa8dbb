//! Fetch engine with retry and backoff
//!
//! Performs idempotent GETs through an [`HttpTransport`]. Each attempt is
//! preceded by a randomized delay; timeouts, connection failures and
//! retryable statuses are retried with exponential backoff plus jitter, and
//! throttling responses (429/503) back off from a longer base. Other 4xx
//! statuses fail immediately.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use super::politeness::{Politeness, PolitenessConfig};

/// Errors from a single transport attempt
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Other(String),
    #[error("content too large: more than {0} bytes")]
    TooLarge(usize),
}

impl TransportError {
    /// Whether the attempt may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connect(_))
    }
}

/// Errors that end a fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    TransientExhausted {
        url: String,
        attempts: u32,
        last: String,
    },
    #[error("permanent failure for {url}: {reason}")]
    Permanent { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether retrying was skipped because the failure cannot resolve itself
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

/// Raw response from one transport attempt
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub final_url: Url,
    pub body: Vec<u8>,
}

/// Minimal HTTP GET seam so the retry engine can run against scripted responses
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url, headers: &[(String, String)]) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_body: usize,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, max_body: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client, max_body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, headers: &[(String, String)]) -> Result<RawResponse, TransportError> {
        let mut request = self.client.get(url.as_str());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let mut response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();

        if response
            .content_length()
            .is_some_and(|len| len > self.max_body as u64)
        {
            return Err(TransportError::TooLarge(self.max_body));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_reqwest_error)? {
            if !append_capped(&mut body, &chunk, self.max_body) {
                return Err(TransportError::TooLarge(self.max_body));
            }
        }

        Ok(RawResponse {
            status,
            final_url,
            body,
        })
    }
}

/// Append at most one byte past `cap`; false once the body exceeds it
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_add(1).saturating_sub(body.len());
    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
    body.len() <= cap
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Retry configuration; holds no state beyond the values themselves
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Backoff base for timeouts and 5xx
    pub base_delay: Duration,
    /// Backoff base for throttling responses (429, 503)
    pub throttle_delay: Duration,
    /// Ceiling for any single backoff
    pub max_delay: Duration,
    /// Statuses worth retrying
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            throttle_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(600),
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Throttling statuses wait longer than a generic failure
    pub fn is_throttle_status(status: u16) -> bool {
        status == 429 || status == 503
    }

    /// Backoff after the `failed_attempt`-th failure (1-based).
    ///
    /// `jitter` is clamped into `[0, 0.5)`; with that bound each delay is
    /// strictly larger than the previous one until `max_delay` is reached.
    pub fn backoff_delay(&self, failed_attempt: u32, throttled: bool, jitter: f64) -> Duration {
        let base = if throttled {
            self.throttle_delay
        } else {
            self.base_delay
        };
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let exp = base.saturating_mul(1u32 << exponent).min(self.max_delay);
        let jitter = jitter.clamp(0.0, 0.499);
        exp.mul_f64(1.0 + jitter).min(self.max_delay)
    }
}

/// Configuration for the fetch engine
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub retry: RetryPolicy,
    pub politeness: PolitenessConfig,
    /// Per-request timeout
    pub timeout: Duration,
    /// Maximum response size (bytes)
    pub max_content_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            politeness: PolitenessConfig::default(),
            timeout: Duration::from_secs(10),
            max_content_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched URL (may differ from request due to redirects)
    pub final_url: Url,
    /// HTTP status code
    pub status_code: u16,
    /// Response body
    pub body: Vec<u8>,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Backoff waits taken between attempts, in order
    pub backoff_delays: Vec<Duration>,
    /// Total time including delays
    pub fetch_duration: Duration,
}

impl FetchResult {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of one attempt, before the retry decision
enum Attempt {
    Success(RawResponse),
    Retry { reason: String, throttled: bool },
    Fail(String),
}

/// Fetch engine; cheap to share, holds no mutable state
pub struct FetchEngine {
    transport: Arc<dyn HttpTransport>,
    politeness: Politeness,
    config: FetchConfig,
}

impl FetchEngine {
    /// Create an engine over the default reqwest transport
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config.timeout, config.max_content_size)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create an engine over a caller-supplied transport
    pub fn with_transport(config: FetchConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let politeness = Politeness::new(config.politeness.clone());
        Self {
            transport,
            politeness,
            config,
        }
    }

    /// Fetch a URL, retrying transient failures
    pub async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let start = Instant::now();
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut backoff_delays = Vec::new();
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.politeness.pre_request_delay()).await;

            let headers = self.politeness.headers();
            match self.attempt(url, &headers).await {
                Attempt::Success(response) => {
                    tracing::debug!(
                        "Fetched {} (status {}, attempt {}/{})",
                        url,
                        response.status,
                        attempt,
                        max_attempts
                    );
                    return Ok(FetchResult {
                        final_url: response.final_url,
                        status_code: response.status,
                        body: response.body,
                        attempts: attempt,
                        backoff_delays,
                        fetch_duration: start.elapsed(),
                    });
                }
                Attempt::Fail(reason) => {
                    tracing::warn!("Permanent failure fetching {}: {}", url, reason);
                    return Err(FetchError::Permanent {
                        url: url.to_string(),
                        reason,
                    });
                }
                Attempt::Retry { reason, throttled } => {
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        max_attempts,
                        url,
                        reason
                    );
                    last_reason = reason;

                    if attempt < max_attempts {
                        let jitter = rand::thread_rng().gen_range(0.0..0.5);
                        let delay = policy.backoff_delay(attempt, throttled, jitter);
                        tracing::debug!("Backing off {:?} before retrying {}", delay, url);
                        backoff_delays.push(delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(FetchError::TransientExhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last: last_reason,
        })
    }

    /// Fetch raw bytes (images); same retry behaviour as [`FetchEngine::fetch`]
    pub async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.fetch(url).await.map(|r| r.body)
    }

    async fn attempt(&self, url: &Url, headers: &[(String, String)]) -> Attempt {
        let response = match self.transport.get(url, headers).await {
            Ok(r) => r,
            Err(e) if e.is_retryable() => {
                return Attempt::Retry {
                    reason: e.to_string(),
                    throttled: false,
                }
            }
            Err(e) => return Attempt::Fail(e.to_string()),
        };

        let status = response.status;
        if (200..300).contains(&status) {
            if response.body.len() > self.config.max_content_size {
                return Attempt::Fail(format!("content too large: {} bytes", response.body.len()));
            }
            return Attempt::Success(response);
        }

        if self.config.retry.is_retryable_status(status) {
            return Attempt::Retry {
                reason: format!("HTTP {}", status),
                throttled: RetryPolicy::is_throttle_status(status),
            };
        }

        Attempt::Fail(format!("HTTP {}", status))
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

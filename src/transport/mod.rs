//! Resilient request execution: rate-limit admission, failure
//! classification, and bounded retry with jittered exponential backoff.
//!
//! Every attempt passes through the connector's `RateLimiter` first. A
//! failed attempt is classified as retryable or terminal; retryable
//! failures back off (`base * multiplier^attempt ± jitter`, capped) until
//! the policy's attempt ceiling or the caller's deadline is reached.
//!
//! Idempotency is explicit per request, never inferred: ambiguous failures
//! (a timeout whose server-side effect is unknown) are retried only for
//! requests marked idempotent. Failures that are provably pre-execution
//! (connection refused, DNS) are retried for any request.
//!
//! Application-level error payloads carried on a successful transport
//! status are NOT handled here — the owning connector translates those.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ConnectorError, Result};
use crate::rate_limit::RateLimiter;

/// Retry configuration attached per connector or per operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Hard ceiling on attempts (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_ms", rename = "base_backoff_ms")]
    pub base_backoff: Duration,
    /// Multiplier applied per retry.
    pub multiplier: f64,
    /// Cap on any single backoff delay.
    #[serde(with = "duration_ms", rename = "max_backoff_ms")]
    pub max_backoff: Duration,
    /// Jitter fraction in `[0, 1]`; each delay is scaled by a random
    /// factor in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the retry following attempt number `attempt`
    /// (zero-based), jitter applied.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_backoff.as_secs_f64());
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((capped * factor).max(0.0))
    }
}

mod duration_ms {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Classification of a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, DNS failure — provably pre-execution.
    ConnectFailed,
    /// Timed out with unknown server-side effect.
    Timeout,
    /// Non-success HTTP status.
    Status(u16),
    /// Anything else (malformed response stream, protocol error).
    Other,
}

impl FailureKind {
    /// Whether this failure may be retried for a request with the given
    /// idempotency marking.
    pub fn retryable(&self, idempotent: bool) -> bool {
        match self {
            // Pre-execution: safe to retry regardless of idempotency
            FailureKind::ConnectFailed => true,
            // Ambiguous: the server may have executed the operation
            FailureKind::Timeout => idempotent,
            // Throttled or unavailable: the request was not executed
            FailureKind::Status(429) | FailureKind::Status(503) => true,
            // Other transient server failures: ambiguous
            FailureKind::Status(408) | FailureKind::Status(500) | FailureKind::Status(502)
            | FailureKind::Status(504) => idempotent,
            FailureKind::Status(_) => false,
            FailureKind::Other => false,
        }
    }
}

/// One outbound request. Built by connectors, executed by the transport.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Explicit idempotency marking — controls retry on ambiguous failures.
    pub idempotent: bool,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl TransportRequest {
    /// GET requests are idempotent by construction.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            idempotent: true,
            timeout: Duration::from_secs(30),
        }
    }

    /// POST requests are non-idempotent unless explicitly marked otherwise.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            idempotent: false,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Marks the operation idempotent. Must reflect the semantics of the
    /// vendor operation, not a guess.
    pub fn idempotent(mut self, yes: bool) -> Self {
        self.idempotent = yes;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw response from one successful send (any HTTP status).
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| ConnectorError::Decode(e.to_string()))
    }
}

/// A send-level failure, before retry classification.
#[derive(Clone, Debug)]
pub struct SendError {
    pub kind: FailureKind,
    pub message: String,
}

/// The network seam. Production uses `ReqwestSender`; tests substitute
/// scripted senders.
#[async_trait]
pub trait HttpSend: Send + Sync {
    async fn send(&self, req: &TransportRequest) -> std::result::Result<TransportResponse, SendError>;
}

/// `reqwest`-backed sender.
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(&self, req: &TransportRequest) -> std::result::Result<TransportResponse, SendError> {
        let mut builder = self
            .client
            .request(req.method.clone(), &req.url)
            .timeout(req.timeout);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                FailureKind::Timeout
            } else if e.is_connect() {
                FailureKind::ConnectFailed
            } else {
                FailureKind::Other
            };
            SendError {
                kind,
                message: e.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| SendError {
            kind: if e.is_timeout() {
                FailureKind::Timeout
            } else {
                FailureKind::Other
            },
            message: e.to_string(),
        })?;

        Ok(TransportResponse { status, body })
    }
}

/// Executes requests with rate-limit admission and bounded retry.
pub struct RetryingTransport {
    connector: String,
    sender: Arc<dyn HttpSend>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(connector: impl Into<String>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self::with_sender(connector, Arc::new(ReqwestSender::new()), limiter, policy)
    }

    pub fn with_sender(
        connector: impl Into<String>,
        sender: Arc<dyn HttpSend>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            connector: connector.into(),
            sender,
            limiter,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes with no overall deadline beyond the retry budget.
    pub async fn execute(&self, req: &TransportRequest) -> Result<TransportResponse> {
        self.execute_with_deadline(req, None).await
    }

    /// Executes a request, retrying per policy.
    ///
    /// `deadline` is an overall wall-clock budget supplied by the caller;
    /// it takes precedence over remaining retry budget — no backoff sleep
    /// is entered that would overrun it.
    pub async fn execute_with_deadline(
        &self,
        req: &TransportRequest,
        deadline: Option<Duration>,
    ) -> Result<TransportResponse> {
        let started = Instant::now();
        let mut last_failure: Option<SendError> = None;

        for attempt in 0..self.policy.max_attempts {
            // The caller deadline bounds rate-limit waits as well as backoff
            let remaining = deadline.map(|budget| budget.saturating_sub(started.elapsed()));
            self.limiter.admit_within(1.0, remaining).await?;

            let failure = match self.sender.send(req).await {
                Ok(resp) if resp.is_success() => {
                    debug!(
                        connector = %self.connector,
                        url = %req.url,
                        attempts = attempt + 1,
                        "Request succeeded"
                    );
                    return Ok(resp);
                }
                Ok(resp) => SendError {
                    kind: FailureKind::Status(resp.status),
                    message: format!("status {}: {}", resp.status, snippet(&resp.body)),
                },
                Err(e) => e,
            };

            let retryable = failure.kind.retryable(req.idempotent);
            warn!(
                connector = %self.connector,
                url = %req.url,
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                kind = ?failure.kind,
                retryable,
                error = %failure.message,
                "Request attempt failed"
            );
            last_failure = Some(failure);

            if !retryable {
                return Err(self.exhausted(attempt + 1, started, last_failure));
            }
            if attempt + 1 == self.policy.max_attempts {
                break;
            }

            let delay = self.policy.backoff_delay(attempt);
            if let Some(budget) = deadline {
                if started.elapsed() + delay >= budget {
                    debug!(
                        connector = %self.connector,
                        url = %req.url,
                        "Caller deadline preempts remaining retry budget"
                    );
                    return Err(self.exhausted(attempt + 1, started, last_failure));
                }
            }
            tokio::time::sleep(delay).await;
        }

        Err(self.exhausted(self.policy.max_attempts, started, last_failure))
    }

    fn exhausted(
        &self,
        attempts: u32,
        started: Instant,
        last_failure: Option<SendError>,
    ) -> ConnectorError {
        ConnectorError::Transport {
            attempts,
            elapsed: started.elapsed(),
            message: last_failure
                .map(|f| f.message)
                .unwrap_or_else(|| "no attempt recorded".to_string()),
        }
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() > 200 {
        let mut end = 200;
        while end > 0 && !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

//! Per-connector token bucket rate limiting.
//!
//! One `RateLimiter` per connector instance — buckets are never shared
//! across connectors. Refill is computed lazily from elapsed wall-clock
//! time at acquisition, so there is no background ticking task. The token
//! count is always within `[0, capacity]`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

/// How admission behaves when the bucket is empty.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireMode {
    /// Fail immediately with `RateLimitExceeded`.
    FailFast,
    /// Sleep in small increments until tokens are available or the
    /// configured timeout elapses, then fail with `RateLimitTimeout`.
    Blocking,
}

/// Rate limit configuration attached to a connector.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum burst size in tokens.
    pub capacity: u32,
    /// Refill rate in tokens per second.
    pub refill_per_sec: f64,
    pub mode: AcquireMode,
    /// Ceiling for blocking waits.
    #[serde(with = "duration_ms", rename = "block_timeout_ms")]
    pub block_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_per_sec: 1.0,
            mode: AcquireMode::Blocking,
            block_timeout: Duration::from_secs(30),
        }
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

/// Token bucket state. Mutated only under the limiter's mutex.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Refill from elapsed time, then consume `cost` tokens if available.
    fn try_consume(&mut self, cost: f64, capacity: f64, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;

        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }
}

/// Token bucket admission control for one connector instance.
///
/// Concurrent acquisitions on the same instance observe a consistent token
/// count — the bucket is guarded by a mutex held only for the refill-and-
/// consume step, never across a sleep.
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
}

/// Sleep slice used while waiting for refill in blocking mode.
const WAIT_INCREMENT: Duration = Duration::from_millis(10);

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: config.capacity as f64,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Fail-fast admission: consume `cost` tokens or fail with
    /// `RateLimitExceeded` without waiting.
    pub fn try_acquire(&self, cost: f64) -> Result<()> {
        let mut bucket = self.bucket.lock().unwrap();
        if bucket.try_consume(cost, self.config.capacity as f64, self.config.refill_per_sec) {
            Ok(())
        } else {
            Err(ConnectorError::RateLimitExceeded)
        }
    }

    /// Blocking admission: wait up to `timeout` for tokens to refill,
    /// sleeping in small increments. The wait is a plain `tokio::time::sleep`
    /// loop, so caller-level cancellation (dropping the future, racing it
    /// against a deadline) interrupts it at any slice boundary.
    pub async fn acquire(&self, cost: f64, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            {
                let mut bucket = self.bucket.lock().unwrap();
                if bucket.try_consume(
                    cost,
                    self.config.capacity as f64,
                    self.config.refill_per_sec,
                ) {
                    return Ok(());
                }
            }
            if started.elapsed() >= timeout {
                return Err(ConnectorError::RateLimitTimeout {
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(WAIT_INCREMENT.min(timeout)).await;
        }
    }

    /// Admission using the configured mode. This is the entry point the
    /// transport calls before every attempt.
    pub async fn admit(&self, cost: f64) -> Result<()> {
        self.admit_within(cost, None).await
    }

    /// Admission with the blocking wait capped by an optional caller
    /// budget. The effective wait is the smaller of the configured
    /// `block_timeout` and the budget, so a caller deadline bounds this
    /// suspension point too.
    pub async fn admit_within(&self, cost: f64, budget: Option<Duration>) -> Result<()> {
        match self.config.mode {
            AcquireMode::FailFast => self.try_acquire(cost),
            AcquireMode::Blocking => {
                let timeout = match budget {
                    Some(b) => self.config.block_timeout.min(b),
                    None => self.config.block_timeout,
                };
                self.acquire(cost, timeout).await
            }
        }
    }

    /// Current token count (refilled to now). Exposed for monitoring.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.config.refill_per_sec).min(self.config.capacity as f64);
        bucket.last_refill = now;
        bucket.tokens
    }
}

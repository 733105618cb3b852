//! Per-tool token-bucket rate limiting
//!
//! Buckets refill continuously and lazily: the token count is recomputed from
//! the elapsed time whenever a bucket is touched, with no background timer.
//! Each bucket has its own lock, so throttling one tool never blocks another.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket configuration for one tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tokens the bucket holds (burst size)
    pub capacity: u32,

    /// Tokens added per second
    pub refill_per_second: f64,
}

impl RateLimitConfig {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    /// `requests` per `period`, starting with a full bucket
    pub fn per_period(requests: u32, period: Duration) -> Self {
        let refill_per_second = if period.is_zero() {
            f64::INFINITY
        } else {
            requests as f64 / period.as_secs_f64()
        };
        Self::new(requests, refill_per_second)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_period(60, Duration::from_secs(60))
    }
}

/// Error returned when no token became available in time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("timed out acquiring a rate-limit token for '{tool_id}' after {waited:?}")]
    TimedOutAcquiring { tool_id: String, waited: Duration },
}

/// Token bucket for a single tool
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.capacity as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_second: config.refill_per_second.max(0.0),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let refilled = self.tokens + elapsed * self.refill_per_second;
        self.tokens = if refilled.is_nan() {
            self.capacity
        } else {
            refilled.min(self.capacity)
        };
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        if self.capacity < 1.0 || self.refill_per_second <= 0.0 {
            return Err(Duration::MAX);
        }
        let needed = 1.0 - self.tokens;
        Err(Duration::try_from_secs_f64(needed / self.refill_per_second).unwrap_or(Duration::MAX))
    }

    /// Current token count after refilling
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Rate limiter holding one bucket per throttled tool
///
/// Tools without a configured bucket are never throttled.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the bucket for a tool
    pub fn configure(&self, tool_id: impl Into<String>, config: RateLimitConfig) {
        let tool_id = tool_id.into();
        tracing::debug!(
            tool = %tool_id,
            capacity = config.capacity,
            refill_per_second = config.refill_per_second,
            "Configured rate limit"
        );
        self.buckets
            .write()
            .insert(tool_id, Arc::new(Mutex::new(TokenBucket::new(config))));
    }

    /// Check if a tool has a bucket
    pub fn is_configured(&self, tool_id: &str) -> bool {
        self.buckets.read().contains_key(tool_id)
    }

    fn bucket(&self, tool_id: &str) -> Option<Arc<Mutex<TokenBucket>>> {
        self.buckets.read().get(tool_id).cloned()
    }

    /// Acquire one token, waiting at most `timeout`
    ///
    /// Fails immediately when the next token cannot arrive before the
    /// deadline, rather than sleeping until the deadline and failing then.
    pub async fn acquire(&self, tool_id: &str, timeout: Duration) -> Result<(), RateLimitError> {
        let Some(bucket) = self.bucket(tool_id) else {
            return Ok(());
        };

        let started = Instant::now();
        loop {
            let now = Instant::now();
            let wait = match bucket.lock().try_take(now) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            let remaining = timeout.saturating_sub(now.saturating_duration_since(started));
            if wait > remaining {
                return Err(RateLimitError::TimedOutAcquiring {
                    tool_id: tool_id.to_string(),
                    waited: now.saturating_duration_since(started),
                });
            }

            tracing::trace!(tool = %tool_id, wait_ms = wait.as_millis() as u64, "Waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available for a tool (None if unthrottled)
    pub fn available(&self, tool_id: &str) -> Option<f64> {
        self.bucket(tool_id)
            .map(|bucket| bucket.lock().available(Instant::now()))
    }
}

//! Token bucket rate limiter for remote label-store calls
//!
//! Tokens refill continuously from elapsed wall-clock time rather than on a
//! fixed tick: `tokens = min(capacity, tokens + elapsed * rate)`. Refill and
//! debit happen in one critical section; a caller that finds a deficit sleeps
//! outside the lock and re-checks, since concurrent acquirers may take the
//! freshly refilled tokens first.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{OrganizerError, Result};

/// Shared token bucket. Clones share the same bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    inner: Arc<Mutex<BucketState>>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    capacity: f64,
    rate: f64,
    last_refill: Instant,
    total_acquired: u64,
    total_waited: Duration,
}

impl BucketState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    /// Create a bucket refilling at `rate` tokens per second, holding at most
    /// `capacity`. The bucket starts full.
    pub fn new(rate: f64, capacity: f64) -> Result<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(OrganizerError::ConfigError(format!(
                "rate limiter rate must be positive, got {}",
                rate
            )));
        }
        if !(capacity.is_finite() && capacity >= 1.0) {
            return Err(OrganizerError::ConfigError(format!(
                "rate limiter capacity must be at least 1, got {}",
                capacity
            )));
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(BucketState {
                tokens: capacity,
                capacity,
                rate,
                last_refill: Instant::now(),
                total_acquired: 0,
                total_waited: Duration::ZERO,
            })),
        })
    }

    /// Wait until `cost` tokens are available, debit them and return the total
    /// time spent waiting.
    ///
    /// A cost above capacity could never be satisfied and is rejected.
    pub async fn acquire(&self, cost: u32) -> Result<Duration> {
        let cost_units = f64::from(cost);
        let started = Instant::now();

        loop {
            let wait_time = {
                let mut state = self.inner.lock().await;
                if cost_units > state.capacity {
                    return Err(OrganizerError::ConfigError(format!(
                        "acquire cost {} exceeds bucket capacity {}",
                        cost, state.capacity
                    )));
                }

                state.refill();
                trace!(
                    "Bucket state: {:.2}/{:.2} tokens available, requesting {}",
                    state.tokens,
                    state.capacity,
                    cost
                );

                if state.tokens >= cost_units {
                    state.tokens -= cost_units;
                    state.total_acquired += u64::from(cost);
                    let waited = started.elapsed();
                    state.total_waited += waited;
                    return Ok(waited);
                }

                let deficit = cost_units - state.tokens;
                Duration::from_secs_f64(deficit / state.rate)
            };

            debug!(
                "Rate limited, waiting {:.3}s for {} tokens",
                wait_time.as_secs_f64(),
                cost
            );
            tokio::time::sleep(wait_time).await;
        }
    }

    /// Debit `cost` tokens only if they are available right now
    pub async fn try_acquire(&self, cost: u32) -> bool {
        let cost_units = f64::from(cost);
        let mut state = self.inner.lock().await;
        state.refill();

        if state.tokens >= cost_units {
            state.tokens -= cost_units;
            state.total_acquired += u64::from(cost);
            true
        } else {
            false
        }
    }

    /// Current token count after refilling, without debiting
    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.inner.lock().await;
        state.refill();
        state.tokens
    }

    pub async fn stats(&self) -> BucketStats {
        let state = self.inner.lock().await;
        BucketStats {
            capacity: state.capacity,
            rate: state.rate,
            total_acquired: state.total_acquired,
            total_waited: state.total_waited,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BucketStats {
    pub capacity: f64,
    /// Tokens per second
    pub rate: f64,
    pub total_acquired: u64,
    pub total_waited: Duration,
}

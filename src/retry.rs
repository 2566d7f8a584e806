//! Exponential backoff around rate-limited remote calls

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{ErrorKind, OrganizerError, Result};
use crate::rate_limiter::TokenBucket;

/// Backoff parameters for one [`RetryingCaller`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to every backoff
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: Duration::try_from_secs_f64(config.base_delay_secs).unwrap_or(Duration::MAX),
            max_jitter: Duration::try_from_secs_f64(config.max_jitter_secs).unwrap_or(Duration::ZERO),
        }
    }

    /// `base_delay * 2^attempt`, without jitter. `attempt` is zero-based.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_secs_f64();
        if max <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(rand::thread_rng().gen_range(0.0..max)).unwrap_or(self.max_jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

/// Where backoff delays are spent
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wraps remote calls with one rate-limiter acquire and transient-error retry
///
/// Only [`ErrorKind::Transient`] failures are retried. Permanent and conflict
/// failures surface on the first occurrence so callers can react to them.
#[derive(Clone)]
pub struct RetryingCaller {
    bucket: TokenBucket,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryingCaller {
    pub fn new(bucket: TokenBucket, policy: RetryPolicy) -> Self {
        Self::with_sleeper(bucket, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(bucket: TokenBucket, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            bucket,
            policy,
            sleeper,
        }
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    /// Run `operation`, retrying transient failures
    ///
    /// A single token is taken before the first attempt; the backoff delay
    /// throttles the retries. After the final attempt the caller returns
    /// [`OrganizerError::Exhausted`] without sleeping again.
    pub async fn call<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let waited = self.bucket.acquire(1).await?;
        if !waited.is_zero() {
            debug!("{} waited {:?} for rate limiter", operation_name, waited);
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.kind() == ErrorKind::Transient => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(
                            "{} failed after {} attempts: {}",
                            operation_name, attempt, e
                        );
                        return Err(OrganizerError::Exhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self
                        .policy
                        .backoff(attempt - 1)
                        .saturating_add(self.policy.jitter());
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:.2}s...",
                        operation_name,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Records requested delays instead of sleeping
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }

    fn caller(max_attempts: u32, sleeper: Arc<RecordingSleeper>) -> RetryingCaller {
        let bucket = TokenBucket::new(1000.0, 100.0).unwrap();
        RetryingCaller::with_sleeper(bucket, policy(max_attempts), sleeper)
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy(7);
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_out_of_range_delays_do_not_panic() {
        let config = ApiConfig {
            base_delay_secs: 1e20,
            max_jitter_secs: 1e20,
            ..ApiConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.base_delay, Duration::MAX);
        assert_eq!(policy.max_jitter, Duration::ZERO);
        assert_eq!(policy.backoff(6), Duration::MAX);
    }

    #[test]
    fn test_zero_jitter() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.jitter(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_succeeds_after_two_transient_failures() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let caller = caller(5, Arc::clone(&sleeper));
        let attempt_count = Arc::new(AtomicU32::new(0));

        let result = caller
            .call("test_op", || {
                let count = Arc::clone(&attempt_count);
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(OrganizerError::ServerError {
                            status: 503,
                            message: "unavailable".to_string(),
                        })
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);

        let delays = sleeper.delays();
        assert_eq!(delays.len(), 2);
        // base * 2^attempt plus jitter in [0, 1)
        assert!(delays[0] >= Duration::from_secs(1) && delays[0] < Duration::from_secs(2));
        assert!(delays[1] >= Duration::from_secs(2) && delays[1] < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let caller = caller(5, Arc::clone(&sleeper));
        let attempt_count = Arc::new(AtomicU32::new(0));

        let result = caller
            .call("test_op", || {
                let count = Arc::clone(&attempt_count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(OrganizerError::NotFound("msg1".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(OrganizerError::NotFound(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let caller = caller(5, Arc::clone(&sleeper));

        let result = caller
            .call("create_label", || async {
                Err::<(), _>(OrganizerError::Conflict("exists".to_string()))
            })
            .await;

        assert!(matches!(result, Err(OrganizerError::Conflict(_))));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_exhausts_without_trailing_sleep() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let caller = caller(3, Arc::clone(&sleeper));
        let attempt_count = Arc::new(AtomicU32::new(0));

        let result = caller
            .call("list_labels", || {
                let count = Arc::clone(&attempt_count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(OrganizerError::RateLimitExceeded { retry_after: 1 })
                }
            })
            .await;

        match result {
            Err(OrganizerError::Exhausted {
                operation,
                attempts,
                last_error,
            }) => {
                assert_eq!(operation, "list_labels");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("Rate limit exceeded"));
            }
            other => panic!("expected Exhausted, got {:?}", other.map(|_| ())),
        }
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_acquires_one_token_per_call() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let caller = caller(4, Arc::clone(&sleeper));
        let attempt_count = Arc::new(AtomicU32::new(0));

        let _ = caller
            .call("test_op", || {
                let count = Arc::clone(&attempt_count);
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(OrganizerError::NetworkError("reset".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(caller.bucket().stats().await.total_acquired, 1);
    }

    #[tokio::test]
    async fn test_immediate_success_does_not_sleep() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let caller = caller(3, Arc::clone(&sleeper));

        let result = caller.call("test_op", || async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert!(sleeper.delays().is_empty());
    }
}

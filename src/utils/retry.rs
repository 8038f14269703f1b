//! Retry utilities with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry behaviour for remote calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of calls made before giving up, first attempt included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay, including server hints.
    pub max_delay: Duration,
    /// Backoff multiplier (delay *= multiplier after each retry).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy that makes at most `max_attempts` calls.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay to wait after a failed attempt, honouring a server hint.
    fn next_delay(&self, current: Duration, hint: Option<Duration>) -> Duration {
        let base = match hint {
            Some(h) if h > current => h,
            _ => current,
        };
        base.min(self.max_delay)
    }
}

/// Retry result indicating what happened.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed, either permanently or after all attempts.
    Failed { last_error: E, attempts: u32 },
}

/// Determines if an error is retryable.
pub trait Retryable {
    /// Returns true if the operation should be retried.
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the remote side, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Execute an async operation with exponential backoff retry.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) => {
                if attempts >= policy.max_attempts || !error.is_retryable() {
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                let wait = policy.next_delay(delay, error.retry_after());
                tracing::debug!(attempt = attempts, ?wait, ?error, "retrying after failure");

                // Add some jitter to avoid thundering herd
                let jitter_ms = rand_jitter(wait.as_millis() as u64 / 4);
                sleep(wait + Duration::from_millis(jitter_ms)).await;

                delay = Duration::try_from_secs_f64(delay.as_secs_f64() * policy.multiplier)
                    .unwrap_or(policy.max_delay)
                    .min(policy.max_delay);
            }
        }
    }
}

/// Generate a random jitter value.
fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    // Time-seeded; not cryptographically secure, fine for jitter
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    seed % max
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
        hint: Option<Duration>,
    }

    impl TestError {
        fn transient() -> Self {
            Self {
                transient: true,
                hint: None,
            }
        }

        fn permanent() -> Self {
            Self {
                transient: false,
                hint: None,
            }
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.transient
        }

        fn retry_after(&self) -> Option<Duration> {
            self.hint
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(3), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>("success")
        })
        .await;

        match result {
            RetryResult::Success(v) => assert_eq!(v, "success"),
            _ => panic!("expected success"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_retries() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(3), || async {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                Err(TestError::transient())
            } else {
                Ok("success")
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("success")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(3), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError::permanent())
        })
        .await;

        match result {
            RetryResult::Failed { attempts, .. } => assert_eq!(attempts, 1),
            _ => panic!("expected failure"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(4), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError::transient())
        })
        .await;

        match result {
            RetryResult::Failed { attempts, .. } => assert_eq!(attempts, 4),
            _ => panic!("expected failure"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_retries() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(1), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError::transient())
        })
        .await;

        assert!(matches!(result, RetryResult::Failed { attempts: 1, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_server_hint_raises_delay_but_respects_cap() {
        let policy = RetryPolicy::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5));

        let d = policy.next_delay(Duration::from_millis(100), Some(Duration::from_secs(2)));
        assert_eq!(d, Duration::from_secs(2));

        let d = policy.next_delay(Duration::from_millis(100), Some(Duration::from_secs(60)));
        assert_eq!(d, Duration::from_secs(5));

        let d = policy.next_delay(Duration::from_millis(100), None);
        assert_eq!(d, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_oversized_backoff_is_capped() {
        let policy = fast(3)
            .with_max_delay(Duration::from_millis(2))
            .with_multiplier(1e308);
        let result = with_retry(&policy, || async { Err::<(), _>(TestError::transient()) }).await;

        assert!(matches!(result, RetryResult::Failed { attempts: 3, .. }));
    }
}

//! Call pacing and retry
//!
//! Every call to the translation service goes through a [`Throttle`], which
//! enforces a minimum interval between calls, and a [`RetryPolicy`], which
//! retries transient failures with capped exponential backoff.

use crate::error::MtResult;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Minimum interval between consecutive calls
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the interval since the previous call has passed
    ///
    /// The wait is a `tokio::time::sleep`, so dropping the future cancels it.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let pause = self.min_interval - elapsed;
                debug!("Throttling for {:?}", pause);
                tokio::time::sleep(pause).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Bounded retry with capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or runs out of attempts
    ///
    /// Each attempt waits on the throttle first. A rate-limit error's
    /// `retry-after` hint replaces the computed backoff, capped at `max_delay`.
    ///
    /// # Arguments
    /// * `throttle` - Pacing shared by all calls of the run
    /// * `label` - Short description for log lines
    /// * `call` - Produces a fresh future per attempt
    ///
    /// # Returns
    /// The first success, or the last error
    pub async fn run<T, F, Fut>(&self, throttle: &Throttle, label: &str, mut call: F) -> MtResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MtResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            throttle.wait().await;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                    let delay = err
                        .retry_after()
                        .map(|hint| hint.min(self.max_delay))
                        .unwrap_or_else(|| self.backoff(attempt));
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt + 1,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!("{} failed after {} attempts: {}", label, attempt + 1, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MtError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }
    }

    // ========== Backoff Tests ==========

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = quick_policy(5);
        assert_eq!(policy.backoff(0), Duration::from_millis(10));
        assert_eq!(policy.backoff(1), Duration::from_millis(20));
        assert_eq!(policy.backoff(2), Duration::from_millis(40));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(200), Duration::from_millis(40));
    }

    // ========== Throttle Tests ==========

    #[tokio::test(start_paused = true)]
    async fn test_throttle_enforces_interval() {
        let throttle = Throttle::new(Duration::from_secs(2));
        let start = Instant::now();
        throttle.wait().await;
        assert!(start.elapsed() < Duration::from_millis(1));
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_zero_interval_never_sleeps() {
        let throttle = Throttle::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            throttle.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    // ========== Retry Tests ==========

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let throttle = Throttle::new(Duration::ZERO);
        let result = quick_policy(5)
            .run(&throttle, "test", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(MtError::Timeout)
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let throttle = Throttle::new(Duration::ZERO);
        let result: MtResult<()> = quick_policy(5)
            .run(&throttle, "test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(MtError::Auth {
                    status: 403,
                    message: "forbidden".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(MtError::Auth { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let throttle = Throttle::new(Duration::ZERO);
        let result: MtResult<()> = quick_policy(3)
            .run(&throttle, "test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(MtError::Network("reset".to_string()))
            })
            .await;
        assert_eq!(result, Err(MtError::Network("reset".to_string())));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_honoured() {
        let attempts = AtomicU32::new(0);
        let throttle = Throttle::new(Duration::ZERO);
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(60),
            ..quick_policy(3)
        };
        let start = Instant::now();
        let result = policy
            .run(&throttle, "test", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(MtError::RateLimited {
                        retry_after: Some(Duration::from_secs(7)),
                    })
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_capped() {
        let attempts = AtomicU32::new(0);
        let throttle = Throttle::new(Duration::ZERO);
        let start = Instant::now();
        let result = quick_policy(3)
            .run(&throttle, "test", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(MtError::RateLimited {
                        retry_after: Some(Duration::from_secs(86_400)),
                    })
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

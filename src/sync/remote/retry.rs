//! Retry policy for pushes to the remote

use crate::sync::error::SyncError;

use log::debug;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::exponential(3, Duration::from_millis(250))
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> RetryPolicy {
        RetryPolicy { max_attempts: max_attempts.max(1), initial_delay, max_delay: Duration::from_secs(10) }
    }

    /// Single attempt, failures surface immediately
    pub fn none() -> RetryPolicy {
        RetryPolicy::exponential(1, Duration::ZERO)
    }

    /// Delay before attempt number `attempt + 1`, doubling each time
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a permanent error, or attempts run out
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, SyncError>
            where F: FnMut() -> Fut, Fut: Future<Output = Result<T, SyncError>> {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    if self.max_attempts == 1 {
                        return Err(err);
                    }
                    return Err(SyncError::RetryExhausted { attempts: attempt, last: Box::new(err) });
                },
                Err(err) => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!("{what} failed (attempt {attempt}/{}): {err}, retrying in {delay:?}", self.max_attempts);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_double_up_to_the_cap() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10), "Capped");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default().run("push", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 { Err(SyncError::Transport("connection reset".to_string())) } else { Ok(n) }
            }
        }).await;
        assert_eq!(result.unwrap(), 2, "Third attempt succeeds");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), SyncError> = RetryPolicy::default().run("push", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Rejected { status: 404, message: "missing".to_string() }) }
        }).await;
        assert!(matches!(result, Err(SyncError::Rejected { status: 404, .. })), "404 surfaced as is");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Single attempt");
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let result: Result<(), SyncError> = RetryPolicy::exponential(2, Duration::from_millis(10)).run("push", || async {
            Err(SyncError::Transport("down".to_string()))
        }).await;
        assert!(matches!(result, Err(SyncError::RetryExhausted { attempts: 2, .. })), "Gave up after 2 attempts");
    }
}

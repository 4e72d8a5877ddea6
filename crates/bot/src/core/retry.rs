//! Bounded retry with exponential backoff for read operations.
//!
//! Only errors classified as transient reads are retried. Everything else
//! returns on the first failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::ReadRetryConfig;
use crate::errors::BotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ReadRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. The last error is returned on exhaustion.
pub async fn retry_read<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, BotError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BotError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "read failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::from_config(&ReadRetryConfig {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 1_500,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1_500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(1_500));
    }

    #[tokio::test]
    async fn test_transient_error_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_read(&fast_policy(3), "position", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BotError::AccountQueryFailed {
                    reason: "connection reset".into(),
                })
            } else {
                Ok(42u32)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_read(&fast_policy(2), "price", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BotError::StalePrice {
                age_seconds: 7_200,
                max_seconds: 3_600,
            })
        })
        .await;

        assert!(matches!(result, Err(BotError::StalePrice { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_read(&fast_policy(5), "plan", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BotError::InsufficientCapacity {
                available: "0".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(BotError::InsufficientCapacity { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

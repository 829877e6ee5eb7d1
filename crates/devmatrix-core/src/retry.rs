//! Retry with exponential backoff and jitter.
//!
//! Transient failures (network, rate limit, timeout) are retried according
//! to a [`RetryPolicy`]; everything else propagates immediately.

use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule for retryable operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Multiplier applied per retry
    pub factor: f64,
    /// Fraction of the delay randomized in either direction
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // base 500ms, factor 2, 3 attempts, 20% jitter
        Self::exponential(3)
    }
}

impl RetryPolicy {
    /// Exponential backoff: 500ms base, doubling, 20% jitter.
    #[must_use]
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 500,
            factor: 2.0,
            jitter: 0.2,
        }
    }

    /// Fixed-interval retries, no jitter. Mostly useful in tests.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms: delay_ms,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self::fixed(1, 0)
    }

    /// Delay to sleep before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exp = self.factor.powi(retry.saturating_sub(1) as i32);
        let nominal = self.base_delay_ms as f64 * exp;
        let jittered = if self.jitter > 0.0 {
            let spread = nominal * self.jitter;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            (nominal + offset).max(0.0)
        } else {
            nominal
        };
        Duration::from_millis(jittered as u64)
    }
}

/// Run `op` until it succeeds, the error stops being retryable, or the
/// policy's attempt budget is exhausted.
///
/// Only transient errors are retried; structured-parse retries need a
/// reminder prompt and are handled by the callers that own the prompt.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<Error> = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay_for(attempt - 1)).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::debug!(attempt, error = %err, "retryable failure, backing off");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::External("retry budget exhausted".into())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn exponential_delays_double() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::exponential(3)
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let policy = RetryPolicy::exponential(3);
        for _ in 0..50 {
            let ms = policy.delay_for(1).as_millis() as f64;
            assert!((400.0..=600.0).contains(&ms), "delay {ms} out of range");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let result = with_retry(&RetryPolicy::fixed(3, 1), move || {
            let calls = Arc::clone(&calls2);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Network("flaky".into()))
                } else {
                    Ok(7u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let result: Result<u32> = with_retry(&RetryPolicy::fixed(3, 1), move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Invariant("broken".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let result: Result<u32> = with_retry(&RetryPolicy::fixed(2, 1), || async {
            Err(Error::RateLimited("429".into()))
        })
        .await;
        match result {
            Err(Error::RateLimited(_)) => {}
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}

//! Bounded-attempt execution of backend calls.
//!
//! Only [`BackendError::RateLimited`] is retried. The wait before retry `i`
//! (0-based) is `base^i + U(0, 1)` seconds; with the defaults that is
//! roughly 1 s → 2 s → 4 s → 8 s. The random part spreads out concurrent
//! summarisation workers that were throttled at the same moment.
//!
//! Any other error ends the operation immediately. After `max_attempts` the
//! unit is permanently failed; nothing here ever aborts the run.

use crate::error::BackendError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Largest jitter added to a delay: one nanosecond short of a full second.
const MAX_JITTER: f64 = 0.999_999_999;

/// Backoff policy: a function from retry index to delay, plus an attempt cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Default: 5.
    pub max_attempts: u32,
    /// Exponential base in seconds. Default: 2.0.
    pub base_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_secs: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` (0-based), with fresh jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen();
        self.delay_with_jitter(retry, jitter)
    }

    /// Deterministic part of [`Self::delay_for`]; `jitter` is clamped into `[0, 1)`.
    pub fn delay_with_jitter(&self, retry: u32, jitter: f64) -> Duration {
        let exp = self.base_secs.powi(retry as i32);
        Duration::from_secs_f64(exp + jitter.clamp(0.0, MAX_JITTER))
    }
}

/// The result of a retried operation together with its retry history.
#[derive(Debug)]
pub struct Attempted<T> {
    /// `Err` means the unit is permanently failed.
    pub outcome: Result<T, BackendError>,
    /// Number of calls made.
    pub attempts: u32,
    /// Delays slept between calls, in order.
    pub delays: Vec<Duration>,
}

/// Run `op` until it succeeds, fails with a non-rate-limit error, or the
/// attempt cap is reached.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = Vec::new();
    let mut last_err = String::new();

    for attempt in 0..max_attempts {
        match op().await {
            Ok(value) => {
                return Attempted {
                    outcome: Ok(value),
                    attempts: attempt + 1,
                    delays,
                }
            }
            Err(BackendError::RateLimited(msg)) => {
                last_err = msg;
                if attempt + 1 == max_attempts {
                    break;
                }
                let wait = policy.delay_for(attempt);
                warn!(
                    "{}: rate limited (attempt {}/{}), retrying in {:.2}s",
                    label,
                    attempt + 1,
                    max_attempts,
                    wait.as_secs_f64()
                );
                sleep(wait).await;
                delays.push(wait);
            }
            Err(e) => {
                warn!("{}: {}", label, e);
                return Attempted {
                    outcome: Err(e),
                    attempts: attempt + 1,
                    delays,
                };
            }
        }
    }

    Attempted {
        outcome: Err(BackendError::Failed(format!(
            "gave up after {max_attempts} rate-limited attempts: {last_err}"
        ))),
        attempts: max_attempts,
        delays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_bounds_follow_exponent() {
        let policy = RetryPolicy::default();
        for retry in 0..4 {
            let lo = 2f64.powi(retry as i32);
            let d = policy.delay_for(retry).as_secs_f64();
            assert!(d >= lo && d < lo + 1.0, "retry {retry}: {d}");
        }
        assert_eq!(policy.delay_with_jitter(3, 0.0), Duration::from_secs(8));
    }

    #[test]
    fn out_of_range_jitter_stays_below_next_second() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_with_jitter(0, 1.0) < Duration::from_secs(2));
        assert!(policy.delay_with_jitter(2, 7.5) < Duration::from_secs(5));
        assert_eq!(policy.delay_with_jitter(1, -3.0), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn three_rate_limits_then_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();

        let attempted = run_with_retry(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(BackendError::RateLimited("429".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(attempted.outcome, Ok("done"));
        assert_eq!(attempted.attempts, 4);
        assert_eq!(attempted.delays.len(), 3);
        for (i, d) in attempted.delays.iter().enumerate() {
            let lo = 2f64.powi(i as i32);
            let secs = d.as_secs_f64();
            assert!(secs >= lo && secs < lo + 1.0, "delay {i} = {secs}");
        }
        let total: Duration = attempted.delays.iter().sum();
        assert!(start.elapsed() >= total);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_permanent_failure() {
        let calls = AtomicU32::new(0);
        let attempted: Attempted<()> = run_with_retry(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::RateLimited("overloaded".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(attempted.delays.len(), 4);
        assert!(matches!(attempted.outcome, Err(BackendError::Failed(_))));
    }

    #[tokio::test]
    async fn generic_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let attempted: Attempted<()> = run_with_retry(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Failed("bad request".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(attempted.delays.is_empty());
        assert_eq!(
            attempted.outcome,
            Err(BackendError::Failed("bad request".into()))
        );
    }
}

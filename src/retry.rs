//! Bounded exponential backoff around one fallible async call.
//!
//! Wrap network calls only. Transform logic must fail fast per record and
//! is never retried. On exhaustion the last error is returned unchanged so
//! the caller can still classify it.
//!
//! Call sites use `backon` directly:
//!
//! ```rust,ignore
//! let body = (|| async { fetch_page().await })
//!     .retry(policy.backoff())
//!     .when(AdapterError::is_transient)
//!     .notify(log_retry)
//!     .await?;
//! ```

use std::fmt::Display;
use std::time::Duration;

use backon::ExponentialBuilder;
use tracing::warn;

/// Backoff schedule: `initial_delay`, then `× multiplier` per attempt,
/// capped at `max_delay`. `attempts` counts the first call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Backoff builder for this policy. No jitter, so delays are exact.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_factor(self.multiplier.max(1.0) as f32)
            .with_max_delay(self.max_delay)
            .with_max_times(self.attempts.max(1) as usize - 1)
    }
}

/// `notify` hook shared by every retried call.
pub fn log_retry<E: Display>(err: &E, delay: Duration) {
    warn!(
        error = %err,
        delay_ms = delay.as_millis() as u64,
        "Attempt failed, retrying"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use backon::{BackoffBuilder, Retryable};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let result: Result<&str, String> = (|| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(format!("boom {n}"))
                } else {
                    Ok("ok")
                }
            }
        })
        .retry(RetryPolicy::default().backoff())
        .notify(log_retry)
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.get(), 3);
        // 1000ms + 2000ms of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), String> = (|| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { Err(format!("fail {n}")) }
        })
        .retry(RetryPolicy::default().backoff())
        .await;
        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_error_not_retried() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let result: Result<(), String> = (|| {
            calls.set(calls.get() + 1);
            async { Err("fatal".to_string()) }
        })
        .retry(RetryPolicy::default().backoff())
        .when(|e: &String| e != "fatal")
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            attempts: 4,
            initial_delay: Duration::from_millis(20_000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
        };
        let delays: Vec<Duration> = policy.backoff().build().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(20_000),
                Duration::from_millis(30_000),
                Duration::from_millis(30_000),
            ]
        );
    }

    #[test]
    fn test_single_attempt_never_sleeps() {
        let policy = RetryPolicy::default().with_attempts(1);
        assert_eq!(policy.backoff().build().count(), 0);
    }
}

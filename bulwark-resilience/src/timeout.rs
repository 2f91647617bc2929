//! Per-attempt timeout guard.
//!
//! Races an operation against a timer. On expiry the operation future is
//! dropped, which is the cancellation signal in async Rust: any work the
//! upstream had already dispatched (e.g. a request on the wire) becomes a
//! discarded, fire-and-forget side effect. True cancellation propagation
//! depends on the upstream honoring future drop.

use std::future::Future;
use std::time::Duration;

use bulwark_core::{BulwarkError, BulwarkResult};
use tracing::warn;

/// Bounds the duration of a single upstream attempt.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    pipeline: String,
    timeout: Duration,
}

impl TimeoutGuard {
    /// Create a guard for the named pipeline.
    pub fn new(pipeline: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pipeline: pipeline.into(),
            timeout,
        }
    }

    /// Run `operation` with this guard's timeout.
    ///
    /// Returns the operation's own result when it completes in time, or
    /// [`BulwarkError::TimedOut`] once the timer expires.
    pub async fn run<T, Fut>(&self, operation: Fut) -> BulwarkResult<T>
    where
        Fut: Future<Output = BulwarkResult<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    pipeline = %self.pipeline,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Operation timed out, dropping in-flight attempt"
                );
                Err(BulwarkError::TimedOut {
                    pipeline: self.pipeline.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out() {
        let guard = TimeoutGuard::new("test", Duration::from_secs(5));

        let result: BulwarkResult<&str> = guard
            .run(async {
                sleep(Duration::from_secs(10)).await;
                Ok("too late")
            })
            .await;

        assert_eq!(
            result,
            Err(BulwarkError::TimedOut {
                pipeline: "test".to_string(),
                timeout: Duration::from_secs(5),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_just_under_the_bound_completes() {
        let guard = TimeoutGuard::new("test", Duration::from_secs(5));

        let result = guard
            .run(async {
                sleep(Duration::from_millis(4999)).await;
                Ok("made it")
            })
            .await;

        assert_eq!(result, Ok("made it"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_passes_through() {
        let guard = TimeoutGuard::new("test", Duration::from_secs(5));

        let result: BulwarkResult<()> = guard
            .run(async { Err(BulwarkError::upstream("connection refused")) })
            .await;

        assert_eq!(result, Err(BulwarkError::upstream("connection refused")));
    }
}

//! Fixed-window rate limiter.
//!
//! Admission control counting permits within discrete, non-overlapping
//! windows. A burst straddling a window rollover may admit up to
//! `2 * permit_limit` calls within a short interval; this is an accepted
//! approximation of fixed-window limiting, simpler than sliding-window and
//! matching common production limiters.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bulwark_core::RateLimitConfig;
use tokio::time::Instant;
use tracing::debug;

/// Mutable window state, guarded by a single lock per limiter instance.
#[derive(Debug)]
struct WindowState {
    /// Start of the current window.
    window_start: Instant,
    /// Permits issued within the current window.
    permits_issued: u32,
}

/// Fixed-window admission control.
///
/// `try_acquire` is a pure admission decision: it never blocks, never
/// suspends and never fails. Callers that are denied receive `false` and
/// may consult [`retry_after`](Self::retry_after) for a rollover hint.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    config: RateLimitConfig,
    state: Mutex<WindowState>,
}

impl FixedWindowRateLimiter {
    /// Create a limiter; the first window starts now.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                permits_issued: 0,
            }),
            config,
        }
    }

    /// Attempt to acquire a permit in the current window.
    ///
    /// Rolls the window over (permits reset to zero, window start moves to
    /// now) when the previous window has fully elapsed.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now >= state.window_start + self.config.window {
            state.window_start = now;
            state.permits_issued = 0;
        }

        if state.permits_issued < self.config.permit_limit {
            state.permits_issued += 1;
            true
        } else {
            debug!(
                permit_limit = self.config.permit_limit,
                window_ms = self.config.window.as_millis() as u64,
                "Rate limit window exhausted"
            );
            false
        }
    }

    /// Time remaining until the current window rolls over.
    ///
    /// Zero when the window has already elapsed, i.e. the next
    /// `try_acquire` will be admitted into a fresh window.
    pub fn retry_after(&self) -> Duration {
        let now = Instant::now();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.window_start + self.config.window).saturating_duration_since(now)
    }

    /// Permit limit for this limiter.
    pub fn permit_limit(&self) -> u32 {
        self.config.permit_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limiter(permit_limit: u32, window: Duration) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(RateLimitConfig::new(permit_limit, window))
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_boundary_admits_exactly_permit_limit() {
        let limiter = limiter(5, Duration::from_secs(3));

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire(), "6th call in the window must be rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rollover_resets_permits() {
        let limiter = limiter(5, Duration::from_secs(3));

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(3)).await;

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_counts_down_to_rollover() {
        let limiter = limiter(1, Duration::from_secs(3));
        assert!(limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.retry_after(), Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.retry_after(), Duration::ZERO);
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_straddling_burst_admits_up_to_double() {
        // Documented fixed-window approximation: a burst around rollover
        // may admit 2 * permit_limit calls in a short straddling interval.
        let limiter = limiter(5, Duration::from_secs(3));

        tokio::time::advance(Duration::from_millis(2900)).await;
        let mut admitted = 0;
        for _ in 0..5 {
            if limiter.try_acquire() {
                admitted += 1;
            }
        }
        tokio::time::advance(Duration::from_millis(200)).await;
        for _ in 0..5 {
            if limiter.try_acquire() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    proptest! {
        #[test]
        fn prop_admissions_never_exceed_permit_limit(
            permit_limit in 1u32..64,
            attempts in 0usize..512,
        ) {
            // All attempts land in one window (no time passes within the
            // loop relative to a one-hour window).
            let limiter = limiter(permit_limit, Duration::from_secs(3600));
            let admitted = (0..attempts).filter(|_| limiter.try_acquire()).count();
            prop_assert_eq!(admitted, attempts.min(permit_limit as usize));
        }
    }
}

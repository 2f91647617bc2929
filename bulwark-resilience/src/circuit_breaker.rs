//! Circuit breaker with failure-ratio accounting.
//!
//! Tracks the failure ratio over a rolling sampling window and trips to an
//! open state that fast-fails calls, then probes recovery with a single
//! half-open trial. Protects a failing or slow upstream from being
//! hammered while it recovers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use bulwark_core::{BulwarkError, BulwarkResult, CircuitBreakerConfig};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation: all calls are allowed through.
    Closed = 0,
    /// Failing fast: calls are rejected until the break duration elapses.
    Open = 1,
    /// Probing recovery: exactly one trial call is allowed at a time.
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            // Default to the safest state.
            _ => CircuitState::Open,
        }
    }
}

/// Outcome of a permitted call, reported back through
/// [`CircuitBreaker::on_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The upstream call succeeded.
    Success,
    /// The upstream call itself failed. This is the only outcome that
    /// feeds failure accounting.
    Failure,
    /// The attempt was abandoned (e.g. timed out) without a verdict on
    /// upstream health. Releases a half-open trial slot without counting.
    Discarded,
}

/// Proof that `before_call` admitted a call. Resolved by passing it to
/// `on_result`. A permit dropped without a verdict releases its trial
/// slot as if the call were discarded, so a caller cancelled mid-trial
/// (its future dropped) cannot leave the breaker stuck half-open.
#[derive(Debug)]
#[must_use = "permits must be resolved via on_result"]
pub struct CircuitPermit {
    trial: bool,
    resolved: bool,
    shared: Weak<BreakerShared>,
}

impl CircuitPermit {
    /// Whether this permit is the single half-open recovery trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if self.resolved || !self.trial {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            let mut window = shared.window.lock().unwrap_or_else(PoisonError::into_inner);
            window.trial_in_flight = false;
        }
    }
}

/// Sample counters and timing, guarded by a single lock per breaker.
#[derive(Debug)]
struct BreakerWindow {
    sample_window_start: Instant,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// State shared with outstanding permits, so a dropped permit can reach
/// back and release its slot.
#[derive(Debug)]
struct BreakerShared {
    state: AtomicU8,
    window: Mutex<BreakerWindow>,
}

/// Failure-ratio circuit breaker, one instance per protected operation
/// name.
///
/// `before_call` never suspends: it returns a permit or a typed
/// [`BulwarkError::CircuitOpen`] rejection synchronously.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    shared: Arc<BreakerShared>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the named operation.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            pipeline = %name,
            failure_ratio = config.failure_ratio,
            minimum_throughput = config.minimum_throughput,
            break_ms = config.break_duration.as_millis() as u64,
            "Circuit breaker initialized"
        );
        Self {
            name,
            shared: Arc::new(BreakerShared {
                state: AtomicU8::new(CircuitState::Closed as u8),
                window: Mutex::new(BreakerWindow {
                    sample_window_start: Instant::now(),
                    failure_count: 0,
                    success_count: 0,
                    opened_at: None,
                    trial_in_flight: false,
                }),
            }),
            config,
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.shared.state.load(Ordering::Acquire))
    }

    fn permit(&self, trial: bool) -> CircuitPermit {
        CircuitPermit {
            trial,
            resolved: false,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Decide whether a call may proceed.
    ///
    /// - `Closed`: always permitted.
    /// - `Open`: rejected until the break duration elapses, then the
    ///   circuit transitions to half-open and issues one trial permit.
    /// - `HalfOpen`: rejected while the trial is outstanding.
    pub fn before_call(&self) -> BulwarkResult<CircuitPermit> {
        let now = Instant::now();
        let mut window = self.shared.window.lock().unwrap_or_else(PoisonError::into_inner);

        match self.state() {
            CircuitState::Closed => {
                self.roll_window(&mut window, now);
                Ok(self.permit(false))
            }
            CircuitState::Open => {
                let reopens_at = window
                    .opened_at
                    .map(|at| at + self.config.break_duration)
                    .unwrap_or(now);
                if now >= reopens_at {
                    self.shared
                        .state
                        .store(CircuitState::HalfOpen as u8, Ordering::Release);
                    window.trial_in_flight = true;
                    info!(pipeline = %self.name, "Circuit half-open, issuing recovery trial");
                    Ok(self.permit(true))
                } else {
                    Err(BulwarkError::CircuitOpen {
                        pipeline: self.name.clone(),
                        retry_after: reopens_at.saturating_duration_since(now),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if window.trial_in_flight {
                    // The outstanding trial may resolve at any moment.
                    Err(BulwarkError::CircuitOpen {
                        pipeline: self.name.clone(),
                        retry_after: Duration::ZERO,
                    })
                } else {
                    window.trial_in_flight = true;
                    Ok(self.permit(true))
                }
            }
        }
    }

    /// Record the outcome of a permitted call.
    pub fn on_result(&self, mut permit: CircuitPermit, outcome: CallOutcome) {
        permit.resolved = true;
        let now = Instant::now();
        let mut window = self.shared.window.lock().unwrap_or_else(PoisonError::into_inner);

        if permit.trial {
            window.trial_in_flight = false;
            match outcome {
                CallOutcome::Success => self.close(&mut window, now),
                CallOutcome::Failure => self.open(&mut window, now),
                CallOutcome::Discarded => {
                    // No verdict: stay half-open, next caller gets a trial.
                    debug!(pipeline = %self.name, "Recovery trial discarded without a verdict");
                }
            }
            return;
        }

        // A non-trial result only matters while the circuit is closed; a
        // late result arriving after a trip is ignored.
        if self.state() != CircuitState::Closed {
            return;
        }

        self.roll_window(&mut window, now);
        match outcome {
            CallOutcome::Success => window.success_count += 1,
            CallOutcome::Failure => window.failure_count += 1,
            CallOutcome::Discarded => return,
        }

        let total = window.failure_count + window.success_count;
        if total >= self.config.minimum_throughput {
            let ratio = f64::from(window.failure_count) / f64::from(total);
            if ratio >= self.config.failure_ratio {
                warn!(
                    pipeline = %self.name,
                    failures = window.failure_count,
                    samples = total,
                    ratio,
                    "Failure ratio threshold reached, tripping circuit"
                );
                self.open(&mut window, now);
            }
        }
    }

    /// Force the circuit back to closed and clear all counters.
    pub fn reset(&self) {
        let now = Instant::now();
        let mut window = self.shared.window.lock().unwrap_or_else(PoisonError::into_inner);
        self.close(&mut window, now);
    }

    /// Reset sample counters when the sampling window has elapsed.
    fn roll_window(&self, window: &mut BreakerWindow, now: Instant) {
        if now >= window.sample_window_start + self.config.sampling_duration {
            window.sample_window_start = now;
            window.failure_count = 0;
            window.success_count = 0;
        }
    }

    fn open(&self, window: &mut BreakerWindow, now: Instant) {
        self.shared
            .state
            .store(CircuitState::Open as u8, Ordering::Release);
        window.opened_at = Some(now);
        window.trial_in_flight = false;
        warn!(
            pipeline = %self.name,
            break_ms = self.config.break_duration.as_millis() as u64,
            "Circuit opened, failing fast"
        );
    }

    fn close(&self, window: &mut BreakerWindow, now: Instant) {
        self.shared
            .state
            .store(CircuitState::Closed as u8, Ordering::Release);
        window.sample_window_start = now;
        window.failure_count = 0;
        window.success_count = 0;
        window.opened_at = None;
        window.trial_in_flight = false;
        info!(pipeline = %self.name, "Circuit closed");
    }

    /// Operation name this breaker protects.
    pub fn name(&self) -> &str {
        &self.name
    }
}

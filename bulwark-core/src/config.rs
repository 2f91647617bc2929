//! Configuration types for pipelines and cache entries.
//!
//! All configuration is constructed at startup and read-only thereafter.
//! Builders follow the workspace convention of chainable `with_*` methods
//! on top of sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Configuration for a named resilience pipeline.
///
/// Stages are optional except the timeout: a pipeline with neither rate
/// limiter nor circuit breaker still bounds every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on a single upstream attempt.
    pub timeout: Duration,
    /// Fixed-window admission control, if enabled.
    pub rate_limit: Option<RateLimitConfig>,
    /// Failure-ratio circuit breaking, if enabled.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rate_limit: None,
            circuit_breaker: None,
        }
    }
}

impl PipelineConfig {
    /// Create a pipeline config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable rate limiting.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Enable circuit breaking.
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    /// Validate all enabled stages.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid(
                "timeout",
                "0",
                "must be greater than zero",
            ));
        }
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        if let Some(circuit_breaker) = &self.circuit_breaker {
            circuit_breaker.validate()?;
        }
        Ok(())
    }
}

/// Fixed-window rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Number of permits issued within one window.
    pub permit_limit: u32,
    /// Window size. Windows are discrete and non-overlapping.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permit_limit: DEFAULT_PERMIT_LIMIT,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

impl RateLimitConfig {
    pub fn new(permit_limit: u32, window: Duration) -> Self {
        Self {
            permit_limit,
            window,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.permit_limit == 0 {
            return Err(ConfigError::invalid(
                "permit_limit",
                self.permit_limit,
                "must be at least 1",
            ));
        }
        if self.window.is_zero() {
            return Err(ConfigError::invalid(
                "window",
                "0",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure ratio in `[0, 1]` that trips the circuit.
    pub failure_ratio: f64,
    /// Rolling sample window for failure accounting.
    pub sampling_duration: Duration,
    /// Minimum samples in the current window before the ratio is
    /// evaluated, avoiding false trips on low traffic.
    pub minimum_throughput: u32,
    /// How long the circuit stays open before a recovery probe.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: DEFAULT_FAILURE_RATIO,
            sampling_duration: Duration::from_secs(DEFAULT_SAMPLING_DURATION_SECS),
            minimum_throughput: DEFAULT_MINIMUM_THROUGHPUT,
            break_duration: Duration::from_secs(DEFAULT_BREAK_DURATION_SECS),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a circuit breaker config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure ratio threshold.
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    /// Set the sampling window.
    pub fn with_sampling_duration(mut self, duration: Duration) -> Self {
        self.sampling_duration = duration;
        self
    }

    /// Set the minimum throughput gate.
    pub fn with_minimum_throughput(mut self, throughput: u32) -> Self {
        self.minimum_throughput = throughput;
        self
    }

    /// Set the break duration.
    pub fn with_break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.failure_ratio) {
            return Err(ConfigError::invalid(
                "failure_ratio",
                self.failure_ratio,
                "must be within [0, 1]",
            ));
        }
        if self.minimum_throughput == 0 {
            return Err(ConfigError::invalid(
                "minimum_throughput",
                self.minimum_throughput,
                "must be at least 1",
            ));
        }
        if self.sampling_duration.is_zero() {
            return Err(ConfigError::invalid(
                "sampling_duration",
                "0",
                "must be greater than zero",
            ));
        }
        if self.break_duration.is_zero() {
            return Err(ConfigError::invalid(
                "break_duration",
                "0",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Expiration policy for a cache entry.
///
/// An entry is evictable once `last_accessed + sliding_expiration` or its
/// absolute deadline passes, whichever comes sooner when both are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryOptions {
    /// Expiration relative to the last access. Refreshed on every read.
    pub sliding_expiration: Option<Duration>,
    /// Expiration relative to creation. Never refreshed.
    pub absolute_expiration: Option<Duration>,
    /// Lifetime of a negative ("not found") marker stored for this key.
    pub negative_expiration: Duration,
}

impl Default for CacheEntryOptions {
    fn default() -> Self {
        Self {
            sliding_expiration: Some(Duration::from_secs(DEFAULT_SLIDING_EXPIRATION_SECS)),
            absolute_expiration: Some(Duration::from_secs(DEFAULT_ABSOLUTE_EXPIRATION_SECS)),
            negative_expiration: Duration::from_secs(DEFAULT_NEGATIVE_EXPIRATION_SECS),
        }
    }
}

impl CacheEntryOptions {
    /// Create entry options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sliding expiration.
    pub fn with_sliding_expiration(mut self, duration: Duration) -> Self {
        self.sliding_expiration = Some(duration);
        self
    }

    /// Set the absolute expiration.
    pub fn with_absolute_expiration(mut self, duration: Duration) -> Self {
        self.absolute_expiration = Some(duration);
        self
    }

    /// Set the negative marker lifetime.
    pub fn with_negative_expiration(mut self, duration: Duration) -> Self {
        self.negative_expiration = duration;
        self
    }

    /// Entry options that never expire (useful for tests and pinned keys).
    pub fn never_expiring() -> Self {
        Self {
            sliding_expiration: None,
            absolute_expiration: None,
            negative_expiration: Duration::from_secs(DEFAULT_NEGATIVE_EXPIRATION_SECS),
        }
    }
}

/// Configuration for the in-memory cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Interval between background sweeps of expired entries.
    pub sweep_interval: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl MemoryCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

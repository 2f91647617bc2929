//! Constants for Bulwark defaults
//!
//! Centralizing defaults makes them easy to find, modify, and test.

// ============================================================================
// PIPELINE
// ============================================================================

/// Default per-attempt timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Default permit limit per fixed window
pub const DEFAULT_PERMIT_LIMIT: u32 = 5;

/// Default fixed-window size in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 3;

// ============================================================================
// CIRCUIT BREAKER
// ============================================================================

/// Default failure ratio that trips the circuit
pub const DEFAULT_FAILURE_RATIO: f64 = 0.5;

/// Default sampling window in seconds for failure accounting
pub const DEFAULT_SAMPLING_DURATION_SECS: u64 = 10;

/// Default minimum samples before the failure ratio is evaluated
pub const DEFAULT_MINIMUM_THROUGHPUT: u32 = 10;

/// Default duration the circuit stays open before probing recovery
pub const DEFAULT_BREAK_DURATION_SECS: u64 = 10;

// ============================================================================
// CACHE
// ============================================================================

/// Default sliding expiration in seconds (2 minutes)
pub const DEFAULT_SLIDING_EXPIRATION_SECS: u64 = 120;

/// Default absolute expiration in seconds (5 minutes)
pub const DEFAULT_ABSOLUTE_EXPIRATION_SECS: u64 = 300;

/// Default lifetime of a negative ("not found") cache marker in seconds
pub const DEFAULT_NEGATIVE_EXPIRATION_SECS: u64 = 30;

/// Default interval between background expiry sweeps in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

//! Error types for Bulwark operations

use std::time::Duration;
use thiserror::Error;

/// Result alias used across the Bulwark workspace.
pub type BulwarkResult<T> = Result<T, BulwarkError>;

/// Failure taxonomy for the resilient cache pipeline.
///
/// Each pipeline stage produces a distinct variant so hosts can map
/// failures to stable external signals (e.g. HTTP 429/503/504) instead of
/// a generic internal error. Variants are `Clone` because a single-flight
/// fetch hands the same failure to every waiter of the flight group.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BulwarkError {
    /// Admission denied by the fixed-window rate limiter.
    ///
    /// `retry_after` is the time until the current window rolls over.
    #[error("rate limit exceeded for pipeline '{pipeline}' ({permit_limit} permits per window), retry after {retry_after:?}")]
    RateLimited {
        pipeline: String,
        permit_limit: u32,
        retry_after: Duration,
    },

    /// The circuit breaker is open; the upstream is presumed unhealthy.
    #[error("circuit open for pipeline '{pipeline}', retry after {retry_after:?}")]
    CircuitOpen {
        pipeline: String,
        retry_after: Duration,
    },

    /// The protected operation did not complete within its timeout.
    #[error("operation timed out after {timeout:?} in pipeline '{pipeline}'")]
    TimedOut { pipeline: String, timeout: Duration },

    /// The protected operation itself failed.
    ///
    /// This is the only outcome that feeds circuit breaker failure
    /// accounting.
    #[error("upstream operation failed: {reason}")]
    Upstream { reason: String },

    /// The cache layer failed while materializing a single-flight result
    /// (e.g. payload serialization). Factory failures propagate as their
    /// original variant, not as this one.
    #[error("cache factory failed: {reason}")]
    CacheFactory { reason: String },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BulwarkError {
    /// Wrap an upstream fault, preserving only its message.
    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream {
            reason: reason.into(),
        }
    }

    /// True for rejections issued before the upstream was invoked
    /// (rate limit or open circuit).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::CircuitOpen { .. })
    }

    /// Retry-after hint for rejections, if one applies.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::CircuitOpen { retry_after, .. } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },
}

impl ConfigError {
    pub fn invalid(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

//! Bulwark Core - Error taxonomy and configuration types
//!
//! Shared foundation for the Bulwark workspace: the failure taxonomy
//! produced by the resilience pipeline and cache layer, plus the immutable
//! configuration bundles constructed at startup.

pub mod config;
pub mod constants;
pub mod error;

pub use config::{
    CacheEntryOptions, CircuitBreakerConfig, MemoryCacheConfig, PipelineConfig, RateLimitConfig,
};
pub use error::{BulwarkError, BulwarkResult, ConfigError};

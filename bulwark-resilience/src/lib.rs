//! Bulwark Resilience - Admission control, circuit breaking and timeouts
//!
//! Composable protection for unreliable upstream calls:
//!
//! - [`FixedWindowRateLimiter`] - non-blocking admission decisions
//! - [`CircuitBreaker`] - failure-ratio fast-fail with recovery probing
//! - [`TimeoutGuard`] - per-attempt time bound
//! - [`ResiliencePipeline`] - fixed-order composition of the above
//! - [`PipelineRegistry`] - named pipelines, configured at startup
//!
//! No retries are performed anywhere in this crate; retry-with-backoff,
//! if desired, is layered by the caller around
//! [`ResiliencePipeline::execute`].

pub mod circuit_breaker;
pub mod pipeline;
pub mod rate_limiter;
pub mod registry;
pub mod timeout;

pub use circuit_breaker::{CallOutcome, CircuitBreaker, CircuitPermit, CircuitState};
pub use pipeline::ResiliencePipeline;
pub use rate_limiter::FixedWindowRateLimiter;
pub use registry::PipelineRegistry;
pub use timeout::TimeoutGuard;

//! Cached resource orchestration.
//!
//! Ties the cache and resilience layers together: reads are cache-aside
//! with single-flight upstream fetches, writes are refresh-on-write, and
//! every upstream call runs through a [`ResiliencePipeline`].
//!
//! [`ResiliencePipeline`]: bulwark_resilience::ResiliencePipeline

// ============================================================================
// Modules
// ============================================================================

pub mod resource;
pub mod service;
pub mod upstream;

// ============================================================================
// Re-exports
// ============================================================================

pub use resource::CacheableResource;
pub use service::CachedResourceService;
pub use upstream::UpstreamRepository;

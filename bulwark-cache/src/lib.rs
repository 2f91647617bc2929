//! Caching layer: store trait, in-memory backend, key scheme.
//!
//! The [`CacheStore`] trait abstracts over backends; [`MemoryCacheStore`]
//! is the in-process implementation with sliding/absolute expiration,
//! negative caching, single-flight fetch de-duplication and a background
//! sweep of expired entries. [`KeyScheme`] standardizes key naming so
//! whole resource families can be invalidated by prefix.

// ============================================================================
// Modules
// ============================================================================

pub mod entry;
pub mod key;
pub mod memory;
pub mod store;

mod single_flight;

// ============================================================================
// Re-exports
// ============================================================================

pub use entry::{CacheEntry, CachedPayload};
pub use key::KeyScheme;
pub use memory::MemoryCacheStore;
pub use store::{CacheLookup, CacheStats, CacheStore, CacheValue};

//! Cacheable resource trait.

use std::fmt::Display;

use bulwark_cache::CacheValue;

/// An entity that can be served through a [`CachedResourceService`].
///
/// The id feeds the per-entity cache key; an owner, when present, feeds the
/// owner-scoped key so writes can invalidate per-owner listings (e.g. a
/// user's favorites).
///
/// [`CachedResourceService`]: crate::CachedResourceService
pub trait CacheableResource: CacheValue + Clone {
    /// Id type, rendered into the per-entity cache key.
    type Id: Display + Clone + Send + Sync + 'static;

    /// The entity's id.
    fn resource_id(&self) -> Self::Id;

    /// The owner this entity belongs to, if it is owner-scoped.
    fn owner(&self) -> Option<String> {
        None
    }
}

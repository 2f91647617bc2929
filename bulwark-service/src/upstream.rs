//! Upstream repository abstraction.

use async_trait::async_trait;
use bulwark_core::BulwarkResult;

use crate::resource::CacheableResource;

/// The unreliable data source behind a [`CachedResourceService`]: a
/// database, a remote HTTP API, anything that can be slow or fail.
///
/// Implementations map their own faults to
/// [`BulwarkError::Upstream`](bulwark_core::BulwarkError::Upstream) so the
/// pipeline's circuit breaker sees them as upstream failures. Rejections
/// and timeouts are produced by the pipeline itself, never by the
/// repository.
///
/// [`CachedResourceService`]: crate::CachedResourceService
#[async_trait]
pub trait UpstreamRepository<T: CacheableResource>: Send + Sync {
    /// Fetch a single entity. `Ok(None)` means the entity does not exist;
    /// that answer is negative-cached by the service.
    async fn fetch_by_id(&self, id: &T::Id) -> BulwarkResult<Option<T>>;

    /// Fetch the whole collection.
    async fn fetch_all(&self) -> BulwarkResult<Vec<T>>;

    /// Fetch the entities belonging to one owner.
    async fn fetch_for_owner(&self, owner: &str) -> BulwarkResult<Vec<T>>;

    /// Insert an entity, returning it as stored.
    async fn insert(&self, entity: T) -> BulwarkResult<T>;

    /// Update an entity, returning it as stored.
    async fn update(&self, entity: T) -> BulwarkResult<T>;

    /// Delete an entity, returning it if it existed.
    async fn delete(&self, id: &T::Id) -> BulwarkResult<Option<T>>;
}

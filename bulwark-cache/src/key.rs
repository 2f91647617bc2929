//! Cache key naming scheme.
//!
//! All keys for one resource family share a namespace prefix, so bulk
//! invalidation (`remove_by_prefix`) can clear a family in one call.

use std::fmt::Display;

/// Key naming scheme for a cached resource family.
///
/// Produces `namespace:id` for per-entity entries, `namespace:all` for the
/// collection entry and `namespace:owner:<name>` for per-owner entries
/// (e.g. a user's favorites).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    namespace: String,
}

impl KeyScheme {
    /// Create a scheme for the given namespace, e.g. `"item"`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Key for a single entity.
    pub fn entity(&self, id: impl Display) -> String {
        format!("{}:{}", self.namespace, id)
    }

    /// Key for the whole collection.
    pub fn collection(&self) -> String {
        format!("{}:all", self.namespace)
    }

    /// Key for an owner-scoped collection.
    pub fn owner(&self, owner: &str) -> String {
        format!("{}:owner:{}", self.namespace, owner)
    }

    /// Prefix covering every key in this namespace.
    pub fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

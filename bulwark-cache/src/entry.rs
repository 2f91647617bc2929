//! Cache entry model: serialized payloads, negative markers and expiry.

use std::sync::Arc;
use std::time::Duration;

use bulwark_core::{BulwarkError, BulwarkResult, CacheEntryOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

/// A cached payload: either a serialized value or a deliberate
/// "not found" marker (negative caching, to avoid repeated expensive
/// misses).
///
/// Values are stored serialized so in-memory and remote backends share
/// one contract; the bytes are reference-counted so single-flight waiters
/// receive cheap clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedPayload {
    /// Serialized value bytes.
    Value(Arc<Vec<u8>>),
    /// The upstream lookup had no result.
    Absent,
}

impl CachedPayload {
    /// Serialize a value into a payload.
    pub fn from_value<V: Serialize>(value: &V) -> BulwarkResult<Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| BulwarkError::CacheFactory {
            reason: format!("payload serialization failed: {e}"),
        })?;
        Ok(Self::Value(Arc::new(bytes)))
    }

    /// Decode into `Some(value)`, or `None` for a negative marker.
    pub fn decode<V: DeserializeOwned>(&self) -> BulwarkResult<Option<V>> {
        match self {
            Self::Value(bytes) => {
                let value =
                    serde_json::from_slice(bytes).map_err(|e| BulwarkError::CacheFactory {
                        reason: format!("payload deserialization failed: {e}"),
                    })?;
                Ok(Some(value))
            }
            Self::Absent => Ok(None),
        }
    }

    /// True for a negative marker.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// A single cache entry with per-entry expiration.
///
/// An entry is evictable once `last_accessed + sliding_expiration` or
/// `absolute_deadline` passes, whichever comes sooner when both are set.
/// Entries are owned exclusively by the store and mutated only through
/// its API.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    payload: CachedPayload,
    created_at: Instant,
    last_accessed_at: Instant,
    sliding_expiration: Option<Duration>,
    absolute_deadline: Option<Instant>,
}

impl CacheEntry {
    /// Create an entry at `now` under the given options.
    ///
    /// Negative markers live for `options.negative_expiration` and ignore
    /// the sliding policy: a marker is a short-lived hint, not data worth
    /// keeping warm.
    pub fn new(payload: CachedPayload, options: &CacheEntryOptions, now: Instant) -> Self {
        let (sliding_expiration, absolute_deadline) = if payload.is_absent() {
            (None, Some(now + options.negative_expiration))
        } else {
            (
                options.sliding_expiration,
                options.absolute_expiration.map(|d| now + d),
            )
        };
        Self {
            payload,
            created_at: now,
            last_accessed_at: now,
            sliding_expiration,
            absolute_deadline,
        }
    }

    /// Whether the entry is evictable at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        if let Some(sliding) = self.sliding_expiration {
            if now > self.last_accessed_at + sliding {
                return true;
            }
        }
        if let Some(deadline) = self.absolute_deadline {
            if now > deadline {
                return true;
            }
        }
        false
    }

    /// Refresh the sliding window on access.
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed_at = now;
    }

    pub fn payload(&self) -> &CachedPayload {
        &self.payload
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(sliding: Option<u64>, absolute: Option<u64>) -> CacheEntryOptions {
        CacheEntryOptions {
            sliding_expiration: sliding.map(Duration::from_secs),
            absolute_expiration: absolute.map(Duration::from_secs),
            negative_expiration: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_expiry_is_inclusive_at_the_deadline() {
        let now = Instant::now();
        let entry = CacheEntry::new(
            CachedPayload::from_value(&42u32).unwrap(),
            &options(None, Some(10)),
            now,
        );

        assert!(!entry.is_expired(now + Duration::from_secs(10)));
        assert!(entry.is_expired(now + Duration::from_millis(10_001)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_extends_sliding_but_not_absolute() {
        let now = Instant::now();
        let mut entry = CacheEntry::new(
            CachedPayload::from_value(&"v").unwrap(),
            &options(Some(5), Some(12)),
            now,
        );

        entry.touch(now + Duration::from_secs(4));
        assert!(!entry.is_expired(now + Duration::from_secs(8)));

        entry.touch(now + Duration::from_secs(8));
        // Absolute deadline wins even with a fresh touch.
        assert!(entry.is_expired(now + Duration::from_secs(13)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_marker_uses_negative_expiration() {
        let now = Instant::now();
        let entry = CacheEntry::new(CachedPayload::Absent, &options(Some(300), Some(600)), now);

        assert!(!entry.is_expired(now + Duration::from_secs(30)));
        assert!(entry.is_expired(now + Duration::from_secs(31)));
    }

    #[test]
    fn test_payload_roundtrip_and_negative_decode() {
        let payload = CachedPayload::from_value(&vec![1u32, 2, 3]).unwrap();
        assert_eq!(payload.decode::<Vec<u32>>().unwrap(), Some(vec![1, 2, 3]));

        assert_eq!(CachedPayload::Absent.decode::<Vec<u32>>().unwrap(), None);
        assert!(CachedPayload::Absent.is_absent());
    }
}

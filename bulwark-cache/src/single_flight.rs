//! Single-flight de-duplication of concurrent fetches.
//!
//! At most one in-flight fetch exists per key. The leader's future is
//! wrapped in [`Shared`] so every waiter polls the same memoized result:
//! the first poller drives the fetch, and if it is dropped another waiter
//! takes over. Results (and errors, which are `Clone`) are handed to all
//! waiters of the flight group.
//!
//! Retirement is the leading caller's job, not the flight's own: the
//! caller that registered the flight removes it once the result is in, or
//! when that caller is dropped mid-flight, so an abandoned fetch never
//! occupies its key forever.

use bulwark_core::BulwarkError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;

use crate::entry::CachedPayload;

/// Result broadcast to every waiter of one flight.
pub(crate) type FlightResult = Result<CachedPayload, BulwarkError>;

/// A shared, memoized in-flight fetch.
pub(crate) type Flight = Shared<BoxFuture<'static, FlightResult>>;

/// Per-key in-flight fetch registry.
#[derive(Default)]
pub(crate) struct FlightGroup {
    flights: DashMap<String, Flight>,
}

impl std::fmt::Debug for FlightGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightGroup")
            .field("in_flight", &self.flights.len())
            .finish()
    }
}

impl FlightGroup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Join the existing flight for `key`, or lead a new one built from
    /// `make`. Returns the flight to await and whether this caller leads.
    pub(crate) fn join_or_lead<F>(&self, key: &str, make: F) -> (Flight, bool)
    where
        F: FnOnce() -> BoxFuture<'static, FlightResult>,
    {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                let flight = make().shared();
                slot.insert(flight.clone());
                (flight, true)
            }
        }
    }

    /// Retire `flight` if it is still the one registered under `key`.
    ///
    /// The pointer comparison keeps a stale handle (a caller retiring
    /// late, after a successor flight started) from removing the
    /// successor.
    pub(crate) fn complete(&self, key: &str, flight: &Flight) {
        self.flights.remove_if(key, |_, current| current.ptr_eq(flight));
    }

    /// Number of fetches currently in progress.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_second_caller_joins_existing_flight() {
        let group = FlightGroup::new();

        let (first, led_first) =
            group.join_or_lead("k", || async { Ok(CachedPayload::Absent) }.boxed());
        let (second, led_second) = group.join_or_lead("k", || {
            async { Err(BulwarkError::upstream("must not be built")) }.boxed()
        });

        assert!(led_first);
        assert!(!led_second);
        assert_eq!(group.in_flight(), 1);

        assert_eq!(first.await, Ok(CachedPayload::Absent));
        assert_eq!(second.await, Ok(CachedPayload::Absent));
    }

    #[tokio::test]
    async fn test_completed_flight_is_retired() {
        let group = FlightGroup::new();
        let payload = CachedPayload::Value(Arc::new(vec![1, 2, 3]));

        let cloned = payload.clone();
        let (flight, _) = group.join_or_lead("k", || async move { Ok(cloned) }.boxed());
        assert_eq!(flight.clone().await, Ok(payload));

        group.complete("k", &flight);
        assert_eq!(group.in_flight(), 0);

        // A fresh call leads a new flight.
        let (_, led) = group.join_or_lead("k", || async { Ok(CachedPayload::Absent) }.boxed());
        assert!(led);
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_retire_a_successor() {
        let group = FlightGroup::new();

        let (old, _) = group.join_or_lead("k", || async { Ok(CachedPayload::Absent) }.boxed());
        group.complete("k", &old);
        assert_eq!(group.in_flight(), 0);

        let (new_flight, led) =
            group.join_or_lead("k", || async { Ok(CachedPayload::Absent) }.boxed());
        assert!(led);

        // Retiring through the old handle again must leave the successor.
        group.complete("k", &old);
        assert_eq!(group.in_flight(), 1);

        group.complete("k", &new_flight);
        assert_eq!(group.in_flight(), 0);
    }
}

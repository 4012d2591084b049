//! The cached value plus its soft-update/hard-expiry deadlines.

use std::time::Instant;

/// Cache keys are opaque, deterministic strings produced by a
/// [`crate::key::KeyExtractor`].
pub type CacheKey = String;

/// An immutable cached entry: a value plus three deadlines.
///
/// `created ≤ update_after ≤ expires_after` always holds for entries built
/// through [`crate::entry_builder::EntryBuilder`]; updates never mutate an
/// `Entry` in place, they build a new one.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The cached payload.
    pub value: V,
    /// When this entry was constructed.
    pub created: Instant,
    /// At/after this instant a read should trigger a background refresh.
    pub update_after: Instant,
    /// At/after this instant the entry is no longer returnable as-is.
    pub expires_after: Instant,
}

impl<V> Entry<V> {
    /// Construct an entry, asserting the deadline ordering invariant holds.
    pub fn new(value: V, created: Instant, update_after: Instant, expires_after: Instant) -> Self {
        debug_assert!(created <= update_after, "created must not be after update_after");
        debug_assert!(
            update_after <= expires_after,
            "update_after must not be after expires_after"
        );
        Self {
            value,
            created,
            update_after,
            expires_after,
        }
    }

    /// `true` once `now` has reached or passed `expires_after`.
    ///
    /// Clock skew where `created > now` is treated as fresh (never expired).
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        if self.created > now {
            return false;
        }
        self.expires_after <= now
    }

    /// `true` once `now` has reached or passed `update_after` but the entry
    /// has not yet expired (the stale-while-revalidate window).
    #[must_use]
    pub fn is_update_due(&self, now: Instant) -> bool {
        if self.created > now {
            return false;
        }
        self.update_after <= now && now < self.expires_after
    }
}

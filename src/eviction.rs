//! Observes reads/writes/releases on keys and nominates eviction victims.

use std::marker::PhantomData;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::entry::{CacheKey, Entry};

/// Default capacity used by [`LruByWriteEvictionPolicy::default`].
pub const DEFAULT_CAPACITY: usize = 4096;

/// Observes key-level reads/writes/releases and nominates victims once
/// capacity is exceeded.
///
/// None of these are suspension points: unlike [`crate::storage::Storage`],
/// an `EvictionPolicy` is called synchronously from the orchestrator between
/// awaits.
pub trait EvictionPolicy<V>: Send + Sync {
    /// A key's entry was read by a caller.
    fn mark_read(&self, key: &CacheKey);

    /// A key's entry was (re)written.
    fn mark_written(&self, key: &CacheKey, entry: &Entry<V>);

    /// A key was explicitly released (evicted or invalidated).
    fn mark_released(&self, key: &CacheKey);

    /// The next key this policy recommends releasing, if capacity is
    /// currently exceeded.
    fn next_to_release(&self) -> Option<CacheKey>;
}

/// Least-recently-*written* eviction: `mark_written` moves a key to the tail
/// of an ordering, `next_to_release` pops the head once `len() > capacity`.
///
/// `mark_read` is intentionally a no-op — writes alone drive recency.
pub struct LruByWriteEvictionPolicy<V> {
    capacity: usize,
    order: Mutex<IndexSet<CacheKey>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> LruByWriteEvictionPolicy<V> {
    /// Create a policy bounding storage to `capacity` write-observed keys.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Mutex::new(IndexSet::new()),
            _value: PhantomData,
        }
    }

    /// Number of keys this policy is currently tracking.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    /// `true` when no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.lock().is_empty()
    }
}

impl<V> Default for LruByWriteEvictionPolicy<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<V: Send + Sync> EvictionPolicy<V> for LruByWriteEvictionPolicy<V> {
    fn mark_read(&self, _key: &CacheKey) {}

    fn mark_written(&self, key: &CacheKey, _entry: &Entry<V>) {
        let mut order = self.order.lock();
        order.shift_remove(key);
        order.insert(key.clone());
    }

    fn mark_released(&self, key: &CacheKey) {
        self.order.lock().shift_remove(key);
    }

    fn next_to_release(&self) -> Option<CacheKey> {
        let mut order = self.order.lock();
        if order.len() > self.capacity {
            order.shift_remove_index(0)
        } else {
            None
        }
    }
}

/// No-op eviction, for when bounding storage is delegated elsewhere (e.g. a
/// remote store with its own TTL, or an unbounded in-process cache).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvictionPolicy;

impl<V: Send + Sync> EvictionPolicy<V> for NoopEvictionPolicy {
    fn mark_read(&self, _key: &CacheKey) {}
    fn mark_written(&self, _key: &CacheKey, _entry: &Entry<V>) {}
    fn mark_released(&self, _key: &CacheKey) {}
    fn next_to_release(&self) -> Option<CacheKey> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_builder::{ConstantLifespanEntryBuilder, EntryBuilder};
    use std::time::Duration;

    fn entry() -> Entry<i32> {
        ConstantLifespanEntryBuilder::new(Duration::from_secs(1), Duration::from_secs(2))
            .build(&"k".to_string(), 0)
    }

    #[test]
    fn under_capacity_nominates_nothing() {
        let policy: LruByWriteEvictionPolicy<i32> = LruByWriteEvictionPolicy::new(2);
        policy.mark_written(&"a".to_string(), &entry());
        assert_eq!(policy.next_to_release(), None);
    }

    #[test]
    fn over_capacity_nominates_the_least_recently_written_key() {
        let policy: LruByWriteEvictionPolicy<i32> = LruByWriteEvictionPolicy::new(2);
        policy.mark_written(&"a".to_string(), &entry());
        policy.mark_written(&"b".to_string(), &entry());
        policy.mark_written(&"c".to_string(), &entry());
        assert_eq!(policy.next_to_release(), Some("a".to_string()));
    }

    #[test]
    fn rewriting_a_key_moves_it_to_the_tail() {
        let policy: LruByWriteEvictionPolicy<i32> = LruByWriteEvictionPolicy::new(2);
        policy.mark_written(&"a".to_string(), &entry());
        policy.mark_written(&"b".to_string(), &entry());
        policy.mark_written(&"a".to_string(), &entry()); // a is now most-recent
        policy.mark_written(&"c".to_string(), &entry());
        // b was written least recently now, not a.
        assert_eq!(policy.next_to_release(), Some("b".to_string()));
    }

    #[test]
    fn mark_released_removes_key_from_ordering() {
        let policy: LruByWriteEvictionPolicy<i32> = LruByWriteEvictionPolicy::new(1);
        policy.mark_written(&"a".to_string(), &entry());
        policy.mark_released(&"a".to_string());
        policy.mark_written(&"b".to_string(), &entry());
        assert_eq!(policy.next_to_release(), None);
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn next_to_release_only_pops_once_per_excess() {
        let policy: LruByWriteEvictionPolicy<i32> = LruByWriteEvictionPolicy::new(1);
        policy.mark_written(&"a".to_string(), &entry());
        policy.mark_written(&"b".to_string(), &entry());
        assert_eq!(policy.next_to_release(), Some("a".to_string()));
        // Once popped, len() is back at/under capacity.
        assert_eq!(policy.next_to_release(), None);
    }

    #[test]
    fn noop_policy_never_nominates_a_victim() {
        let policy = NoopEvictionPolicy;
        for i in 0..10 {
            policy.mark_written(&i.to_string(), &entry());
        }
        assert_eq!(EvictionPolicy::<i32>::next_to_release(&policy), None);
    }
}

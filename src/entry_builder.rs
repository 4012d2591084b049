//! Builds [`Entry`] instances from freshly produced values, stamping deadlines.

use std::time::{Duration, Instant};

use crate::entry::{CacheKey, Entry};

/// Default soft-update delay used by [`ConstantLifespanEntryBuilder::default`].
pub const DEFAULT_UPDATE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Default hard-expiry delay used by [`ConstantLifespanEntryBuilder::default`].
pub const DEFAULT_EXPIRE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Constructs a fresh [`Entry`] for a value that was just produced.
///
/// Pure with respect to the cache: a builder only stamps deadlines (and may
/// inspect the value to compute them), it never touches `Storage` or any
/// other collaborator.
pub trait EntryBuilder<V>: Send + Sync {
    /// Build an entry for `value`, computed for `key`.
    fn build(&self, key: &CacheKey, value: V) -> Entry<V>;
}

/// Builder using fixed offsets from "now", independent of the value.
///
/// This is the library default: 10 minute soft update, 30 minute hard
/// expiry.
#[derive(Debug, Clone)]
pub struct ConstantLifespanEntryBuilder {
    update_after: Duration,
    expires_after: Duration,
}

impl ConstantLifespanEntryBuilder {
    /// Build with explicit offsets. `expires_after` must be `>= update_after`;
    /// violating this only matters once entries are read, since `Entry::new`
    /// asserts the ordering in debug builds.
    #[must_use]
    pub fn new(update_after: Duration, expires_after: Duration) -> Self {
        Self {
            update_after,
            expires_after,
        }
    }
}

impl Default for ConstantLifespanEntryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_AFTER, DEFAULT_EXPIRE_AFTER)
    }
}

impl<V> EntryBuilder<V> for ConstantLifespanEntryBuilder {
    fn build(&self, _key: &CacheKey, value: V) -> Entry<V> {
        let now = Instant::now();
        Entry::new(
            value,
            now,
            now + self.update_after,
            now + self.expires_after,
        )
    }
}

/// Builder that inspects the produced value to decide deadlines, for values
/// that carry their own freshness hint (e.g. a TTL read off an HTTP response
/// or a row's `updated_at` column).
pub struct ValueDrivenEntryBuilder<V> {
    deadlines: Box<dyn Fn(&V) -> (Duration, Duration) + Send + Sync>,
}

impl<V> ValueDrivenEntryBuilder<V> {
    /// `deadlines` maps a produced value to `(update_after, expires_after)`
    /// offsets from "now".
    pub fn new(deadlines: impl Fn(&V) -> (Duration, Duration) + Send + Sync + 'static) -> Self {
        Self {
            deadlines: Box::new(deadlines),
        }
    }
}

impl<V: Send + Sync> EntryBuilder<V> for ValueDrivenEntryBuilder<V> {
    fn build(&self, _key: &CacheKey, value: V) -> Entry<V> {
        let now = Instant::now();
        let (update_after, expires_after) = (self.deadlines)(&value);
        Entry::new(value, now, now + update_after, now + expires_after)
    }
}

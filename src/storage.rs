//! Asynchronous key → [`Entry`] mapping.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::entry::{CacheKey, Entry};
use crate::error::Result;

/// Asynchronous storage for cache entries.
///
/// Every method is a suspension point even for the in-memory implementation,
/// so callers that care about `is_being_updated` staying authoritative must
/// re-check it after any of these calls.
///
/// Methods return [`Result`] so non-local backends (a remote cache, a
/// disk-backed store) can surface I/O failures; those propagate up through
/// the orchestrator as refresh failures. [`InMemoryStorage`] never fails.
#[async_trait]
pub trait Storage<V>: Send + Sync {
    /// Look up `key`. Returns `None` if absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<Entry<V>>>;

    /// Unconditionally write `entry` for `key`.
    ///
    /// The caller is responsible for not overwriting newer data — this
    /// storage layer does not itself compare freshness.
    async fn offer(&self, key: &CacheKey, entry: Entry<V>) -> Result<()>;

    /// Remove `key`, if present. Idempotent.
    async fn release(&self, key: &CacheKey) -> Result<()>;
}

/// Straightforward in-memory [`Storage`], backed by a [`DashMap`].
///
/// This is the default storage and the only one this crate ships; remote
/// backends are out of scope but must preserve the same asynchronous
/// contract.
pub struct InMemoryStorage<V> {
    entries: DashMap<CacheKey, Entry<V>>,
}

impl<V> InMemoryStorage<V> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Current number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for InMemoryStorage<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync> Storage<V> for InMemoryStorage<V> {
    async fn get(&self, key: &CacheKey) -> Result<Option<Entry<V>>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn offer(&self, key: &CacheKey, entry: Entry<V>) -> Result<()> {
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn release(&self, key: &CacheKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

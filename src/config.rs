//! Cache configuration: the collaborators a [`crate::orchestrator::MemoizedCache`]
//! is wrapped with, plus the handful of scalar knobs controlling producer
//! timeouts and stuck-slot detection.
//!
//! A builder that starts out unconfigured (a `configured` flag) and is
//! filled in with collaborators before being handed to [`crate::wrap`], or a
//! one-call default that is immediately usable.

use std::sync::Arc;
use std::time::Duration;

use crate::entry_builder::{ConstantLifespanEntryBuilder, EntryBuilder};
use crate::eviction::{EvictionPolicy, LruByWriteEvictionPolicy};
use crate::key::{IdentityArgsKeyExtractor, KeyArgs, KeyExtractor};
use crate::postprocess::{IdentityPostprocessor, Postprocessor};
use crate::registry::DEFAULT_UPDATE_LOCK_TIMEOUT;
use crate::storage::{InMemoryStorage, Storage};

/// Default producer timeout: how long a single producer invocation is
/// allowed to run before it is treated as a failure.
pub const DEFAULT_PRODUCER_TIMEOUT: Duration = Duration::from_secs(60);

/// The collaborators and scalar knobs a [`crate::orchestrator::MemoizedCache`]
/// needs. Cheap to clone: every collaborator is held behind an `Arc`.
pub struct CacheConfig<V, A: KeyArgs> {
    configured: bool,
    producer_timeout: Duration,
    update_lock_timeout: Duration,
    entry_builder: Arc<dyn EntryBuilder<V>>,
    key_extractor: Arc<dyn KeyExtractor<A>>,
    storage: Arc<dyn Storage<V>>,
    eviction_policy: Arc<dyn EvictionPolicy<V>>,
    postprocessor: Arc<dyn Postprocessor<V>>,
}

impl<V, A: KeyArgs> Clone for CacheConfig<V, A> {
    fn clone(&self) -> Self {
        Self {
            configured: self.configured,
            producer_timeout: self.producer_timeout,
            update_lock_timeout: self.update_lock_timeout,
            entry_builder: Arc::clone(&self.entry_builder),
            key_extractor: Arc::clone(&self.key_extractor),
            storage: Arc::clone(&self.storage),
            eviction_policy: Arc::clone(&self.eviction_policy),
            postprocessor: Arc::clone(&self.postprocessor),
        }
    }
}

impl<V, A> CacheConfig<V, A>
where
    V: Clone + Send + Sync + 'static,
    A: KeyArgs,
{
    /// An unconfigured builder, seeded with the library defaults for every
    /// collaborator. Calling [`crate::wrap`] with `configured = false` fails
    /// with [`crate::Error::NotConfigured`]; use [`Self::mark_configured`]
    /// once the caller is satisfied with the collaborators in place, or
    /// start from [`Self::default_in_memory`].
    #[must_use]
    pub fn builder() -> Self {
        Self {
            configured: false,
            producer_timeout: DEFAULT_PRODUCER_TIMEOUT,
            update_lock_timeout: DEFAULT_UPDATE_LOCK_TIMEOUT,
            entry_builder: Arc::new(ConstantLifespanEntryBuilder::default()),
            key_extractor: Arc::new(IdentityArgsKeyExtractor),
            storage: Arc::new(InMemoryStorage::new()),
            eviction_policy: Arc::new(LruByWriteEvictionPolicy::default()),
            postprocessor: Arc::new(IdentityPostprocessor),
        }
    }

    /// A ready-to-use configuration with every collaborator at its library
    /// default: [`ConstantLifespanEntryBuilder`], [`IdentityArgsKeyExtractor`],
    /// [`InMemoryStorage`], [`LruByWriteEvictionPolicy`], [`IdentityPostprocessor`].
    #[must_use]
    pub fn default_in_memory() -> Self {
        let mut config = Self::builder();
        config.configured = true;
        config
    }

    /// `true` once this configuration may be used to [`crate::wrap`] a
    /// producer.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Mark this configuration ready for use.
    pub fn mark_configured(mut self) -> Self {
        self.configured = true;
        self
    }

    /// Override the entry builder.
    #[must_use]
    pub fn with_entry_builder(mut self, entry_builder: impl EntryBuilder<V> + 'static) -> Self {
        self.entry_builder = Arc::new(entry_builder);
        self
    }

    /// Override the key extractor.
    #[must_use]
    pub fn with_key_extractor(mut self, key_extractor: impl KeyExtractor<A> + 'static) -> Self {
        self.key_extractor = Arc::new(key_extractor);
        self
    }

    /// Override the storage backend.
    #[must_use]
    pub fn with_storage(mut self, storage: impl Storage<V> + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Override the eviction policy.
    #[must_use]
    pub fn with_eviction_policy(mut self, eviction_policy: impl EvictionPolicy<V> + 'static) -> Self {
        self.eviction_policy = Arc::new(eviction_policy);
        self
    }

    /// Override the postprocessor.
    #[must_use]
    pub fn with_postprocessor(mut self, postprocessor: impl Postprocessor<V> + 'static) -> Self {
        self.postprocessor = Arc::new(postprocessor);
        self
    }

    /// Override the producer timeout.
    #[must_use]
    pub fn with_producer_timeout(mut self, timeout: Duration) -> Self {
        self.producer_timeout = timeout;
        self
    }

    /// Override the stuck-slot timeout.
    #[must_use]
    pub fn with_update_lock_timeout(mut self, timeout: Duration) -> Self {
        self.update_lock_timeout = timeout;
        self
    }

    pub(crate) fn producer_timeout(&self) -> Duration {
        self.producer_timeout
    }

    pub(crate) fn update_lock_timeout(&self) -> Duration {
        self.update_lock_timeout
    }

    pub(crate) fn entry_builder(&self) -> &Arc<dyn EntryBuilder<V>> {
        &self.entry_builder
    }

    pub(crate) fn key_extractor(&self) -> &Arc<dyn KeyExtractor<A>> {
        &self.key_extractor
    }

    pub(crate) fn storage(&self) -> &Arc<dyn Storage<V>> {
        &self.storage
    }

    pub(crate) fn eviction_policy(&self) -> &Arc<dyn EvictionPolicy<V>> {
        &self.eviction_policy
    }

    pub(crate) fn postprocessor(&self) -> &Arc<dyn Postprocessor<V>> {
        &self.postprocessor
    }
}

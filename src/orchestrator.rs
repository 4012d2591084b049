//! The wrapper that turns a producer into a memoized, single-flight,
//! stale-while-revalidate cache.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entry::{CacheKey, Entry};
use crate::error::{CauseError, Error, Result};
use crate::invalidation::InvalidationSupport;
use crate::key::{KeyArgs, ProducerRef};
use crate::registry::{SlotFailure, SlotOutcome, UpdateRegistry};

/// An idempotent operation this crate memoizes. `call` is invoked at most
/// once per key at any given time (single-flight).
///
/// Implement this directly for stateful producers, or build one from a
/// closure with [`FnProducer`].
pub trait Producer<A, V>: Send + Sync {
    /// Produce a fresh value for `args`.
    fn call(&self, args: A) -> BoxFuture<'static, std::result::Result<V, CauseError>>;
}

/// Adapts an `Fn(A) -> Future<Output = Result<V, CauseError>>` closure into a
/// [`Producer`].
pub struct FnProducer<F> {
    f: F,
}

impl<F> FnProducer<F> {
    /// Wrap `f` as a [`Producer`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut, A, V> Producer<A, V> for FnProducer<F>
where
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<V, CauseError>> + Send + 'static,
{
    fn call(&self, args: A) -> BoxFuture<'static, std::result::Result<V, CauseError>> {
        Box::pin((self.f)(args))
    }
}

/// A producer wrapped with memoization. Created by [`wrap`].
///
/// Cheap to clone — every field is an `Arc` or a plain `Clone` value — and
/// the clones share the same underlying storage, update registry, and
/// eviction state, so cloning is the supported way to hand this to multiple
/// tasks (the alternative, wrapping in an outer `Arc`, also works).
pub struct MemoizedCache<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    producer: Arc<dyn Producer<A, V>>,
    producer_ref: ProducerRef,
    config: CacheConfig<V, A>,
    registry: Arc<UpdateRegistry<V>>,
}

impl<A, V> Clone for MemoizedCache<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            producer_ref: self.producer_ref.clone(),
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Wrap `producer` in a memoized, single-flight, stale-while-revalidate
/// cache. `name` becomes the producer's symbolic identity and is what
/// [`crate::key::NameArgsKeyExtractor`] folds into a key; it need not be
/// unique, but sharing a name across distinct producers means sharing their
/// keys too.
///
/// If `invalidation` is given, it is bound to this producer's storage, key
/// extractor, and identity, so [`InvalidationSupport::invalidate_for_arguments`]
/// starts working immediately.
#[must_use]
pub fn wrap<A, V>(
    name: impl Into<Cow<'static, str>>,
    producer: impl Producer<A, V> + 'static,
    config: CacheConfig<V, A>,
    invalidation: Option<&InvalidationSupport<V, A>>,
) -> MemoizedCache<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    let producer_ref = ProducerRef::new(name);
    if let Some(invalidation) = invalidation {
        invalidation.bind(
            Arc::clone(config.storage()),
            Arc::clone(config.key_extractor()),
            producer_ref.clone(),
        );
    }
    let registry = Arc::new(UpdateRegistry::with_timeout(config.update_lock_timeout()));
    MemoizedCache {
        producer: Arc::new(producer),
        producer_ref,
        config,
        registry,
    }
}

impl<A, V> MemoizedCache<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Call the memoized producer for `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`] if the configuration this cache was
    /// wrapped with was never marked configured, or
    /// [`Error::CachedMethodFailed`] if the refresh this call triggered or
    /// waited on ultimately failed (producer error, producer timeout, or a
    /// concurrent refresh that itself failed).
    pub async fn call(&self, args: A) -> Result<V> {
        self.call_inner(args, false).await
    }

    /// Call the memoized producer for `args`, forcing a blocking refresh
    /// even if a fresh entry is cached.
    ///
    /// # Errors
    ///
    /// Same as [`Self::call`].
    pub async fn call_with_force_refresh(&self, args: A) -> Result<V> {
        self.call_inner(args, true).await
    }

    async fn call_inner(&self, args: A, force_refresh: bool) -> Result<V> {
        if !self.config.is_configured() {
            return Err(Error::NotConfigured);
        }

        let key = self.config.key_extractor().format_key(&self.producer_ref, &args);
        let current = self.config.storage().get(&key).await.map_err(|err| {
            Error::cached_method_failed_with(
                "storage lookup failed",
                Box::new(crate::error::ProducerError(err.to_string())),
            )
        })?;
        if current.is_some() {
            self.config.eviction_policy().mark_read(&key);
        }
        let now = Instant::now();

        let entry = match current {
            None => {
                debug!(key = %key, "cache miss, blocking refresh");
                self.refresh(None, key, args).await?
            }
            Some(entry) if force_refresh => {
                debug!(key = %key, "force_refresh requested, blocking refresh");
                self.refresh(Some(entry), key, args).await?
            }
            Some(entry) if entry.is_expired(now) => {
                debug!(key = %key, "entry expired, blocking refresh");
                self.refresh(None, key, args).await?
            }
            Some(entry) if entry.is_update_due(now) => {
                debug!(key = %key, "entry stale, serving current value and refreshing in background");
                let serving = entry.clone();
                self.spawn_background_refresh(entry, key, args);
                serving
            }
            Some(entry) => entry,
        };

        self.config.postprocessor().apply(entry.value)
    }

    /// The single-flight coordination body.
    ///
    /// `current = None` means "treat this as if nothing were cached" — used
    /// both for a genuine cache miss and for an expired entry, since both
    /// cases must block on a fresh value rather than hand back a stale one.
    /// `current = Some(_)` is reserved for `force_refresh` over a still-fresh
    /// entry and for the stale-while-revalidate background path, where a
    /// concurrent update already in flight means returning the current value
    /// without waiting is correct.
    ///
    /// Which caller becomes the initiator is decided by
    /// [`UpdateRegistry::mark_being_updated`] alone — its check-then-insert
    /// is one atomic `DashMap` shard operation, so two concurrent calls for
    /// the same key can never both win even on a multi-threaded runtime.
    /// Only the call that actually wins spawns the producer; every other
    /// caller, concurrent or not, only ever awaits the slot the winner armed.
    ///
    /// Regardless of which branch arms the slot, the producer itself always
    /// runs in a detached [`tokio::spawn`] task, never inline in this future:
    /// dropping the caller's awaiting task must not stop a producer call
    /// already under way — only `await_updated` is dropped, the spawned task
    /// keeps running and still populates storage.
    async fn refresh(&self, current: Option<Entry<V>>, key: CacheKey, args: A) -> Result<Entry<V>> {
        let is_initiator = self.registry.mark_being_updated(&key).is_ok();
        if is_initiator {
            self.spawn_producer_task(key.clone(), args);
        }

        match (current, is_initiator) {
            (Some(entry), false) => {
                debug!(key = %key, "concurrent refresh already running, returning current value");
                Ok(entry)
            }
            _ => {
                debug!(key = %key, "awaiting refresh");
                match self.registry.await_updated(&key).await? {
                    SlotOutcome::Ready(entry) => Ok(entry),
                    // The initiator (the call that won the race to arm the slot) gets
                    // the specific reason the producer failed for; a call that only
                    // fanned in on someone else's already-running refresh gets a
                    // single "concurrent refresh failed" reason regardless of the
                    // underlying failure kind, per spec: it never re-invokes the
                    // producer itself and has nothing more specific to report.
                    SlotOutcome::Failed(failure) if is_initiator => Err(initiator_failure_error(failure)),
                    SlotOutcome::Failed(_failure) => {
                        Err(Error::cached_method_failed("concurrent refresh failed"))
                    }
                }
            }
        }
    }

    /// Run the producer under `producer_timeout` in a detached task, `offer`
    /// a successful value to storage, and resolve every awaiter through the
    /// registry slot armed by the caller just before spawning this.
    fn spawn_producer_task(&self, key: CacheKey, args: A) {
        let producer = Arc::clone(&self.producer);
        let registry = Arc::clone(&self.registry);
        let storage = Arc::clone(self.config.storage());
        let entry_builder = Arc::clone(self.config.entry_builder());
        let eviction_policy = Arc::clone(self.config.eviction_policy());
        let producer_timeout = self.config.producer_timeout();
        let this = self.clone();

        tokio::spawn(async move {
            let outcome = tokio::time::timeout(producer_timeout, producer.call(args)).await;

            match outcome {
                Ok(Ok(value)) => {
                    let entry = entry_builder.build(&key, value);
                    if let Err(storage_err) = storage.offer(&key, entry.clone()).await {
                        warn!(key = %key, error = %storage_err, "storage offer failed during refresh");
                        let _ = registry.mark_update_aborted(&key, storage_err.to_string());
                        return;
                    }
                    let _ = registry.mark_updated(&key, entry.clone());
                    eviction_policy.mark_written(&key, &entry);
                    if let Some(victim) = eviction_policy.next_to_release() {
                        this.spawn_try_release(victim);
                    }
                }
                Ok(Err(source)) => {
                    warn!(key = %key, error = %source, "producer failed");
                    let _ = registry.mark_update_aborted(&key, source.to_string());
                }
                Err(_elapsed) => {
                    warn!(key = %key, timeout = ?producer_timeout, "producer timed out");
                    let _ = registry.mark_update_timed_out(&key);
                }
            }
        });
    }

    /// Case C of the classification table: fire-and-forget refresh behind
    /// the stale value already being returned to the caller.
    fn spawn_background_refresh(&self, current: Entry<V>, key: CacheKey, args: A) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.refresh(Some(current), key.clone(), args).await {
                warn!(key = %key, error = %err, "background refresh failed");
            }
        });
    }

    /// Release an evicted key from storage, unless it has since been
    /// re-armed for update. Errors are logged and swallowed.
    fn spawn_try_release(&self, key: CacheKey) {
        let registry = Arc::clone(&self.registry);
        let storage = Arc::clone(self.config.storage());
        let eviction_policy = Arc::clone(self.config.eviction_policy());
        tokio::spawn(async move {
            if registry.is_being_updated(&key) {
                debug!(key = %key, "skipping release, key is being updated again");
                return;
            }
            match storage.release(&key).await {
                Ok(()) => eviction_policy.mark_released(&key),
                Err(err) => warn!(key = %key, error = %err, "try_release failed"),
            }
        });
    }
}

/// Reason text for a call that armed the slot itself (the initiator of the
/// producer invocation), distinct from a call that only awaited someone
/// else's already-running refresh — see [`MemoizedCache::refresh`].
fn initiator_failure_error(failure: SlotFailure) -> Error {
    match failure {
        SlotFailure::Aborted(reason) => Error::cached_method_failed_with(
            "refresh failed to complete",
            Box::new(crate::error::ProducerError(reason)),
        ),
        SlotFailure::ProducerTimeout => Error::cached_method_failed("refresh timed out"),
        SlotFailure::StuckTimeout => {
            Error::cached_method_failed("refresh got stuck and timed out")
        }
    }
}

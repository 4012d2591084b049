//! Manual cache invalidation, bound to a wrapped producer at `wrap()` time.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::key::{KeyArgs, KeyExtractor, ProducerRef};
use crate::storage::Storage;

struct Binding<V, A: KeyArgs> {
    storage: Arc<dyn Storage<V>>,
    key_extractor: Arc<dyn KeyExtractor<A>>,
    producer: ProducerRef,
}

/// Auxiliary façade letting callers manually evict a memoized entry by its
/// original call arguments.
///
/// Unbound by default; [`crate::wrap`] binds it to the `Storage`,
/// `KeyExtractor`, and producer identity it was passed alongside. Using it
/// before binding is a caller misuse, surfaced as [`Error::InvalidationUnbound`].
///
/// Invalidation does not cancel an in-flight producer: a refresh already
/// running completes and `offer`s its result, which a later call may then
/// observe. Callers needing strict invalidate-then-call ordering must
/// serialize the two themselves.
pub struct InvalidationSupport<V, A: KeyArgs> {
    binding: RwLock<Option<Binding<V, A>>>,
}

impl<V, A: KeyArgs> InvalidationSupport<V, A> {
    /// Create an unbound invalidation façade, to be passed to [`crate::wrap`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            binding: RwLock::new(None),
        }
    }

    /// `true` once [`Self::bind`] has been called.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.read().is_some()
    }

    pub(crate) fn bind(
        &self,
        storage: Arc<dyn Storage<V>>,
        key_extractor: Arc<dyn KeyExtractor<A>>,
        producer: ProducerRef,
    ) {
        *self.binding.write() = Some(Binding {
            storage,
            key_extractor,
            producer,
        });
    }

    /// Release the cached entry for the given call arguments.
    ///
    /// Repeated calls with the same arguments are equivalent to one, since
    /// `Storage::release` is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidationUnbound`] if this instance was never
    /// passed to [`crate::wrap`].
    pub async fn invalidate_for_arguments(&self, args: &A) -> Result<()> {
        let (storage, key) = {
            let guard = self.binding.read();
            let binding = guard.as_ref().ok_or(Error::InvalidationUnbound)?;
            let key = binding.key_extractor.format_key(&binding.producer, args);
            (Arc::clone(&binding.storage), key)
        };
        debug!(key = %key, "invalidating cache entry");
        storage.release(&key).await?;
        Ok(())
    }
}

impl<V, A: KeyArgs> Default for InvalidationSupport<V, A> {
    fn default() -> Self {
        Self::new()
    }
}

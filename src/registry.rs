//! Per-key single-flight coordinator: at most one producer invocation per
//! key, its outcome fanned out to every concurrent awaiter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::entry::{CacheKey, Entry};
use crate::error::{Error, Result};

/// Default stuck-slot timeout: guards against a slot being armed but never
/// resolved, e.g. because the producer task was dropped without calling
/// back.
pub const DEFAULT_UPDATE_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How a slot was resolved when it did not end in a fresh [`Entry`].
#[derive(Debug, Clone)]
pub enum SlotFailure {
    /// [`UpdateRegistry::mark_update_aborted`] was called with this message:
    /// the producer failed or was cooperatively cancelled.
    Aborted(String),
    /// [`UpdateRegistry::mark_update_timed_out`] was called: the producer did
    /// not complete within `producer_timeout`.
    ProducerTimeout,
    /// The slot's [`DEFAULT_UPDATE_LOCK_TIMEOUT`] elapsed before it was
    /// resolved.
    StuckTimeout,
}

/// The outcome [`UpdateRegistry::await_updated`] observed for a slot.
#[derive(Debug, Clone)]
pub enum SlotOutcome<V> {
    /// The in-flight producer completed and built this entry.
    Ready(Entry<V>),
    /// The in-flight producer failed, was aborted, or got stuck.
    Failed(SlotFailure),
}

type Signal<V> = Option<SlotOutcome<V>>;

struct Slot<V> {
    tx: watch::Sender<Signal<V>>,
    rx: watch::Receiver<Signal<V>>,
    timeout_handle: JoinHandle<()>,
    #[allow(dead_code)]
    armed_at: Instant,
}

/// Tracks, per key, whether a producer invocation is currently in flight and
/// fans its outcome out to every task that calls [`UpdateRegistry::await_updated`]
/// while it is.
///
/// At most one slot exists per key at any time. A resolution ([`UpdateRegistry::mark_updated`] or
/// [`UpdateRegistry::mark_update_aborted`], or the stuck-slot timeout) is
/// final: the slot is removed, and a fresh [`UpdateRegistry::mark_being_updated`]
/// installs a new one.
pub struct UpdateRegistry<V> {
    slots: Arc<DashMap<CacheKey, Slot<V>>>,
    update_lock_timeout: Duration,
}

impl<V> UpdateRegistry<V> {
    /// Create a registry using [`DEFAULT_UPDATE_LOCK_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_UPDATE_LOCK_TIMEOUT)
    }

    /// Create a registry with a custom stuck-slot timeout.
    #[must_use]
    pub fn with_timeout(update_lock_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            update_lock_timeout,
        }
    }

    /// Checks if an update for `key` is in progress.
    ///
    /// Valid only until the next suspension point — re-check after any
    /// `await`. This is a point-in-time snapshot, not a lock: on a
    /// multi-threaded runtime another task may arm or resolve the slot
    /// between this call returning and whatever the caller does next.
    /// [`Self::mark_being_updated`] is the only call that may be used to
    /// decide single-flight initiation, since its check-then-insert is one
    /// atomic `DashMap` operation; this method is for best-effort checks
    /// (e.g. deciding whether a background release is safe) where a stale
    /// answer is tolerable.
    #[must_use]
    pub fn is_being_updated(&self, key: &CacheKey) -> bool {
        self.slots.contains_key(key)
    }
}

impl<V> Default for UpdateRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> UpdateRegistry<V> {
    /// Arm a slot for `key` — the single-flight gate. On a multi-threaded
    /// runtime, this is the only call in the crate allowed to decide whether
    /// a caller becomes the initiator of a refresh: the check ("is a slot
    /// already there?") and the insert happen as one atomic `DashMap` shard
    /// operation via [`dashmap::Map::entry`], so two concurrent callers for
    /// the same key can never both win. Callers MUST treat
    /// [`Error::Internal`] from this call as "someone else just became the
    /// initiator", not as a bug, unless they already hold some other
    /// guarantee that no concurrent caller exists for this key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a slot for `key` already exists.
    pub fn mark_being_updated(&self, key: &CacheKey) -> Result<()> {
        match self.slots.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::Internal(format!(
                "key {key} is already being updated"
            ))),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                let timeout_tx = tx.clone();
                let timeout_key = key.clone();
                let timeout_slots = Arc::clone(&self.slots);
                let timeout_after = self.update_lock_timeout;

                let timeout_handle = tokio::spawn(async move {
                    tokio::time::sleep(timeout_after).await;
                    let Some(slot) = timeout_slots.get(&timeout_key) else {
                        return;
                    };
                    if !slot.tx.same_channel(&timeout_tx) {
                        // The slot was resolved and re-armed since we were scheduled.
                        return;
                    }
                    drop(slot);
                    debug!(key = %timeout_key, "update-lock timeout elapsed, resolving slot as stuck");
                    let _ = timeout_tx.send(Some(SlotOutcome::Failed(SlotFailure::StuckTimeout)));
                    timeout_slots.remove(&timeout_key);
                });

                vacant.insert(Slot {
                    tx,
                    rx,
                    timeout_handle,
                    armed_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Resolve `key`'s slot with a successfully built entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if no slot exists for `key`.
    pub fn mark_updated(&self, key: &CacheKey, entry: Entry<V>) -> Result<()> {
        self.resolve(key, SlotOutcome::Ready(entry))
    }

    /// Resolve `key`'s slot with a failure. `reason` becomes the message
    /// every current and future awaiter observes (cancellation is a valid
    /// reason).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if no slot exists for `key`.
    pub fn mark_update_aborted(&self, key: &CacheKey, reason: impl Into<String>) -> Result<()> {
        self.resolve(key, SlotOutcome::Failed(SlotFailure::Aborted(reason.into())))
    }

    /// Resolve `key`'s slot as having exceeded `producer_timeout`, distinct
    /// from [`Self::mark_update_aborted`] so awaiters can tell a timeout
    /// from a producer's own failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if no slot exists for `key`.
    pub fn mark_update_timed_out(&self, key: &CacheKey) -> Result<()> {
        self.resolve(key, SlotOutcome::Failed(SlotFailure::ProducerTimeout))
    }

    fn resolve(&self, key: &CacheKey, outcome: SlotOutcome<V>) -> Result<()> {
        let Some((_, slot)) = self.slots.remove(key) else {
            return Err(Error::Internal(format!("key {key} is not being updated")));
        };
        slot.timeout_handle.abort();
        // No receiver is a legitimate outcome: every awaiter may have been
        // dropped (e.g. their caller was cancelled) before resolution.
        let _ = slot.tx.send(outcome);
        Ok(())
    }

    /// Wait for `key`'s in-flight update to resolve.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if no slot exists for `key` — callers must
    /// check [`Self::is_being_updated`] first.
    pub async fn await_updated(&self, key: &CacheKey) -> Result<SlotOutcome<V>> {
        let mut rx = {
            let slot = self
                .slots
                .get(key)
                .ok_or_else(|| Error::Internal(format!("key {key} is not being updated")))?;
            slot.rx.clone()
        };

        loop {
            {
                let signal = rx.borrow_and_update();
                if let Some(outcome) = signal.as_ref() {
                    return Ok(outcome.clone());
                }
            }
            rx.changed()
                .await
                .map_err(|_| Error::Internal(format!("slot sender for {key} dropped without resolving")))?;
        }
    }
}

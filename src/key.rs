//! Derives a deterministic string [`crate::entry::CacheKey`] from a
//! producer's identity and the arguments it was called with.

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::entry::CacheKey;

/// Hashes `parts` into a 64-hex-char SHA-256 digest, NUL-separated so that,
/// e.g., producer id `"12"` + args `"3"` cannot collide with id `"1"` + args
/// `"23"`. Mirrors the host application's own `derive_key` helper for
/// idempotency keys.
fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\0");
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// A stable identifier for one `wrap()`-ed producer, assigned from a
/// process-wide counter at wrap time.
///
/// Using a registration token rather than object-address/pointer identity
/// keeps key derivation deterministic within a process; it does not survive
/// a restart.
#[derive(Debug, Clone)]
pub struct ProducerRef {
    /// Process-unique, monotonically assigned identity.
    pub id: u64,
    /// Caller-supplied symbolic name, used by the name-based extractor.
    pub name: Cow<'static, str>,
}

impl ProducerRef {
    /// Allocate a fresh [`ProducerRef`] for `name`.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }
}

/// A bundle of call arguments that can render itself into the string a
/// [`KeyExtractor`] folds into a cache key.
///
/// Blanket-implemented for any `Debug` type, so a producer's argument type
/// — bare value or tuple — works as-is. Types wanting
/// [`NameArgsKeyExtractor`]'s `skip_first_arg` behavior (dropping a leading
/// bound-method-style receiver from the key) wrap their arguments in
/// [`WithReceiver`] instead of relying on tuple arity, since specializing
/// this blanket impl per tuple arity would conflict with it.
pub trait KeyArgs: Send + Sync {
    /// Full representation of the arguments.
    fn repr(&self) -> String;

    /// Representation with the leading receiver element removed, for
    /// receiver-style arguments. Defaults to [`KeyArgs::repr`] when there is
    /// no natural leading element to drop.
    fn repr_skip_first(&self) -> String {
        self.repr()
    }
}

impl<T: Debug + Send + Sync> KeyArgs for T {
    fn repr(&self) -> String {
        format!("{self:?}")
    }
}

/// Call arguments with a leading receiver element (e.g. a bound method's
/// `self`) kept separate from the rest, so [`KeyArgs::repr_skip_first`] can
/// drop it without needing a per-tuple-arity trait impl.
///
/// Deliberately does not derive/implement `Debug` on the wrapper itself —
/// only on its fields — so it falls outside [`KeyArgs`]'s blanket impl and
/// this inherent impl is the only one that applies to it.
pub struct WithReceiver<Receiver, Rest> {
    /// The receiver element, included in [`KeyArgs::repr`] but dropped by
    /// [`KeyArgs::repr_skip_first`].
    pub receiver: Receiver,
    /// Everything after the receiver.
    pub rest: Rest,
}

impl<Receiver, Rest> WithReceiver<Receiver, Rest> {
    /// Pair a `receiver` with the `rest` of the call arguments.
    #[must_use]
    pub fn new(receiver: Receiver, rest: Rest) -> Self {
        Self { receiver, rest }
    }
}

impl<Receiver, Rest> KeyArgs for WithReceiver<Receiver, Rest>
where
    Receiver: Debug + Send + Sync,
    Rest: Debug + Send + Sync,
{
    fn repr(&self) -> String {
        format!("({:?}, {:?})", self.receiver, self.rest)
    }

    fn repr_skip_first(&self) -> String {
        format!("{:?}", self.rest)
    }
}

/// Pure function from (producer identity, call arguments) to a cache key.
pub trait KeyExtractor<A: KeyArgs>: Send + Sync {
    /// Compute the key two calls must agree on to be treated as equivalent.
    fn format_key(&self, producer: &ProducerRef, args: &A) -> CacheKey;
}

/// Keys include the producer's process-assigned identity token, so two
/// `wrap()` calls over the "same" logical producer (e.g. after a restart)
/// never collide — and distinct producer instances never collide either.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityArgsKeyExtractor;

impl<A: KeyArgs> KeyExtractor<A> for IdentityArgsKeyExtractor {
    fn format_key(&self, producer: &ProducerRef, args: &A) -> CacheKey {
        let id = producer.id.to_string();
        digest(&["id", &id, &args.repr()])
    }
}

/// Keys include only the producer's symbolic name, so they are stable across
/// process restarts — at the cost of collisions between distinct producers
/// that happen to share a name.
#[derive(Debug, Clone)]
pub struct NameArgsKeyExtractor {
    skip_first_arg: bool,
}

impl NameArgsKeyExtractor {
    /// `skip_first_arg`: drop the leading positional argument before
    /// formatting (for bound-method-style receivers that should not be part
    /// of the key).
    #[must_use]
    pub fn new(skip_first_arg: bool) -> Self {
        Self { skip_first_arg }
    }
}

impl Default for NameArgsKeyExtractor {
    /// Does not skip the first argument.
    fn default() -> Self {
        Self::new(false)
    }
}

impl<A: KeyArgs> KeyExtractor<A> for NameArgsKeyExtractor {
    fn format_key(&self, producer: &ProducerRef, args: &A) -> CacheKey {
        let args_repr = if self.skip_first_arg {
            args.repr_skip_first()
        } else {
            args.repr()
        };
        digest(&["name", producer.name.as_ref(), &args_repr])
    }
}

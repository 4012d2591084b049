//! Error types for the memoization cache

use std::fmt;

use thiserror::Error;

/// Result type alias for the memoization cache
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed, type-erased cause of a refresh failure.
pub type CauseError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Memoization cache errors.
///
/// All user-visible failures collapse into [`Error::CachedMethodFailed`] with
/// a `reason` describing which branch of the refresh state machine produced
/// it (producer timeout, producer failure, or a concurrent refresh that
/// itself failed), plus an optional boxed cause. Misconfiguration and
/// invalidation misuse are distinct, immediately-surfaced variants. Registry
/// invariant violations (double-arming a slot, resolving one that was never
/// armed) are programmer errors and use [`Error::Internal`].
#[derive(Error, Debug)]
pub enum Error {
    /// Cache invoked while `configured = false`.
    #[error("cache is not configured")]
    NotConfigured,

    /// A cached method's refresh failed to complete: producer timeout,
    /// producer failure/cancellation, or a concurrent refresh this call was
    /// waiting on ended in failure.
    #[error("cached method failed: {reason}")]
    CachedMethodFailed {
        /// Human-readable description of which refresh branch failed.
        reason: String,
        /// The underlying cause, if one is available.
        #[source]
        source: Option<CauseError>,
    },

    /// [`crate::invalidation::InvalidationSupport`] was used before being
    /// bound to a wrapped producer.
    #[error("invalidation support used before binding to a memoized producer")]
    InvalidationUnbound,

    /// An orchestrator/registry invariant was violated: double-arming an
    /// [`crate::registry::UpdateRegistry`] slot, or resolving one that was
    /// never armed. These indicate a bug in the orchestrator, not in caller
    /// code, and should never occur through the public API.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::CachedMethodFailed`] with no further cause.
    pub fn cached_method_failed(reason: impl Into<String>) -> Self {
        Self::CachedMethodFailed {
            reason: reason.into(),
            source: None,
        }
    }

    /// Build a [`Error::CachedMethodFailed`] wrapping `source` as the cause.
    pub fn cached_method_failed_with(reason: impl Into<String>, source: CauseError) -> Self {
        Self::CachedMethodFailed {
            reason: reason.into(),
            source: Some(source),
        }
    }
}

/// Adapter so producer errors (which callers express as boxed
/// `std::error::Error`s) can be wrapped without forcing a concrete error type
/// on the whole crate.
#[derive(Debug)]
pub struct ProducerError(pub String);

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ProducerError {}

//! Async, single-flight, stale-while-revalidate memoization for idempotent
//! producers.
//!
//! # Overview
//!
//! [`wrap`] turns a [`Producer`] — any idempotent `async fn(args) -> Result<V, _>`
//! — into a [`MemoizedCache`] that:
//!
//! - serves a fresh cached value without calling the producer again;
//! - coordinates concurrent callers for the same key so at most one producer
//!   call is in flight at a time, fanning its outcome out to every waiter;
//! - serves a stale value immediately while refreshing it in the background
//!   once its soft `update_after` deadline has passed (stale-while-revalidate);
//! - blocks on a fresh value once the hard `expires_after` deadline has
//!   passed;
//! - bounds how many entries are kept via a pluggable [`EvictionPolicy`];
//! - supports manual invalidation through [`InvalidationSupport`].
//!
//! # Example
//!
//! ```no_run
//! use memoize::config::CacheConfig;
//! use memoize::orchestrator::{wrap, FnProducer};
//!
//! # async fn run() -> memoize::Result<()> {
//! let producer = FnProducer::new(|user_id: u64| async move {
//!     // fetch_profile(user_id).await
//!     Ok::<_, memoize::error::CauseError>(format!("profile-{user_id}"))
//! });
//!
//! let cache = wrap("fetch_profile", producer, CacheConfig::default_in_memory(), None);
//! let profile = cache.call(42).await?;
//! # let _ = profile;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod entry;
pub mod entry_builder;
pub mod error;
pub mod eviction;
pub mod invalidation;
pub mod key;
pub mod orchestrator;
pub mod postprocess;
pub mod registry;
pub mod serde;
pub mod storage;

pub use config::CacheConfig;
pub use entry::Entry;
pub use error::{Error, Result};
pub use invalidation::InvalidationSupport;
pub use orchestrator::{wrap, FnProducer, MemoizedCache, Producer};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a `tracing` subscriber for applications embedding this crate.
///
/// This crate itself only emits `tracing` events (spec: logging is ambient,
/// not excluded by the "no metrics" non-goal); it never installs a global
/// subscriber on its own, so library consumers are free to wire up their own.
/// This helper is provided for binaries and tests that want the same
/// `EnvFilter` + `fmt` setup used throughout this crate's own test suite.
///
/// `level` is used only if `RUST_LOG` is unset. `format` selects `"json"` for
/// structured output; anything else (including `None`) uses the default
/// human-readable format.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}

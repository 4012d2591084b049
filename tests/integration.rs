//! End-to-end scenarios for the memoization cache: cold hit, expiry,
//! stale-while-revalidate, eviction, producer failure fan-out, producer
//! timeout, stale-with-throwing-refresh, and manual invalidation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use pretty_assertions::assert_eq;

use memoize::config::CacheConfig;
use memoize::entry_builder::ConstantLifespanEntryBuilder;
use memoize::error::{CauseError, Error, ProducerError};
use memoize::eviction::LruByWriteEvictionPolicy;
use memoize::orchestrator::{wrap, FnProducer};
use memoize::InvalidationSupport;

fn counter_producer(
    calls: Arc<AtomicUsize>,
) -> FnProducer<impl Fn((i32,)) -> BoxFuture<'static, Result<i32, CauseError>>> {
    FnProducer::new(move |(n,): (i32,)| {
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(n * 10)
        }) as BoxFuture<'static, Result<i32, CauseError>>
    })
}

#[tokio::test]
async fn cold_hit_invokes_the_producer_and_returns_its_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = wrap("cold", counter_producer(Arc::clone(&calls)), CacheConfig::default_in_memory(), None);

    assert_eq!(cache.call((4,)).await.unwrap(), 40);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A second call with the same arguments is served from cache.
    assert_eq!(cache.call((4,)).await.unwrap(), 40);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expiry_forces_a_blocking_refresh() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CacheConfig::default_in_memory().with_entry_builder(
        ConstantLifespanEntryBuilder::new(Duration::from_millis(5), Duration::from_millis(10)),
    );
    let cache = wrap("expiring", counter_producer(Arc::clone(&calls)), config, None);

    cache.call((1,)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;

    // The entry is past expires_after: this call blocks on a fresh value.
    assert_eq!(cache.call((1,)).await.unwrap(), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn update_due_serves_stale_and_refreshes_in_the_background() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CacheConfig::default_in_memory().with_entry_builder(
        ConstantLifespanEntryBuilder::new(Duration::from_millis(5), Duration::from_secs(60)),
    );
    let cache = wrap("stale", counter_producer(Arc::clone(&calls)), config, None);

    cache.call((1,)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Past update_after but well before expires_after: stale value served
    // immediately, without waiting on the refresh this call triggers.
    let started = std::time::Instant::now();
    let value = cache.call((1,)).await.unwrap();
    assert_eq!(value, 10);
    assert!(started.elapsed() < Duration::from_millis(15));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn eviction_releases_the_least_recently_written_key_over_capacity() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CacheConfig::default_in_memory().with_eviction_policy(LruByWriteEvictionPolicy::new(2));
    let cache = wrap("bounded", counter_producer(Arc::clone(&calls)), config, None);

    cache.call((1,)).await.unwrap();
    cache.call((2,)).await.unwrap();
    cache.call((3,)).await.unwrap(); // pushes key 1 over capacity

    // Give the spawned try_release task a chance to run.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let calls_before = calls.load(Ordering::SeqCst);
    cache.call((1,)).await.unwrap(); // evicted: must re-invoke the producer
    assert_eq!(calls.load(Ordering::SeqCst), calls_before + 1);
}

#[tokio::test]
async fn concurrent_callers_on_a_failing_producer_all_see_the_failure() {
    let producer = FnProducer::new(|(_,): (i32,)| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(Box::new(ProducerError("upstream unavailable".into())) as CauseError)
        }) as BoxFuture<'static, Result<i32, CauseError>>
    });
    let cache = wrap("flaky", producer, CacheConfig::default_in_memory(), None);

    let c1 = cache.clone();
    let c2 = cache.clone();
    let c3 = cache.clone();
    let (r1, r2, r3) = tokio::join!(c1.call((1,)), c2.call((1,)), c3.call((1,)));

    for result in [r1, r2, r3] {
        assert!(matches!(result.unwrap_err(), Error::CachedMethodFailed { .. }));
    }
}

#[tokio::test]
async fn producer_timeout_fails_the_call_without_hanging() {
    let producer = FnProducer::new(|(_,): (i32,)| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }) as BoxFuture<'static, Result<i32, CauseError>>
    });
    let config = CacheConfig::default_in_memory().with_producer_timeout(Duration::from_millis(15));
    let cache = wrap("slow", producer, config, None);

    let err = cache.call((1,)).await.unwrap_err();
    assert!(matches!(err, Error::CachedMethodFailed { .. }));
}

#[tokio::test]
async fn a_throwing_background_refresh_does_not_disturb_the_stale_value_already_returned() {
    let first_call = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let producer = FnProducer::new(move |(n,): (i32,)| {
        let first_call = Arc::clone(&first_call);
        Box::pin(async move {
            if first_call.swap(false, Ordering::SeqCst) {
                Ok(n * 10)
            } else {
                Err(Box::new(ProducerError("refresh failed".into())) as CauseError)
            }
        }) as BoxFuture<'static, Result<i32, CauseError>>
    });
    let config = CacheConfig::default_in_memory().with_entry_builder(
        ConstantLifespanEntryBuilder::new(Duration::from_millis(5), Duration::from_secs(60)),
    );
    let cache = wrap("stale-then-failing", producer, config, None);

    let first = cache.call((1,)).await.unwrap();
    assert_eq!(first, 10);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Stale read triggers a background refresh that will fail; the caller
    // still gets the last good value, not the failure.
    let second = cache.call((1,)).await.unwrap();
    assert_eq!(second, 10);

    tokio::time::sleep(Duration::from_millis(20)).await;
    // The storage entry is untouched by the failed background refresh.
    let third = cache.call((1,)).await.unwrap();
    assert_eq!(third, 10);
}

#[tokio::test]
async fn manual_invalidation_forces_the_next_call_to_recompute() {
    let calls = Arc::new(AtomicUsize::new(0));
    let invalidation: InvalidationSupport<i32, (i32,)> = InvalidationSupport::new();
    let cache = wrap(
        "invalidatable",
        counter_producer(Arc::clone(&calls)),
        CacheConfig::default_in_memory(),
        Some(&invalidation),
    );

    cache.call((7,)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    invalidation.invalidate_for_arguments(&(7,)).await.unwrap();

    cache.call((7,)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Invalidating a key that was never cached is a harmless no-op.
    invalidation.invalidate_for_arguments(&(999,)).await.unwrap();
}

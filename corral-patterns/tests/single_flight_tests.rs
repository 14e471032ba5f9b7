//! Single-flight behavior of `get_or_create` and `one_pass_create`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corral_core::{CachePort, CorralError, MemoryCache};
use corral_patterns::{Cached, OnePass, Pass};
use corral_test_utils::assertions::assert_unavailable;
use corral_test_utils::fixtures::fast_cached_config;
use corral_test_utils::RecordingCache;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_compute_once() {
    let cached = Arc::new(Cached::new(Arc::new(MemoryCache::new())));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cached = Arc::clone(&cached);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cached
                .get_or_create(
                    "report",
                    || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, CorralError>(Some("built".to_string()))
                    },
                    None,
                )
                .await
        }));
    }

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value.as_deref(), Some("built"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_reads_value_written_by_owner() {
    let cache = Arc::new(MemoryCache::new());
    let cached = Cached::new(Arc::clone(&cache));

    let pass = OnePass::new(Arc::clone(&cache), "one_pass:k", Duration::from_secs(10), None);
    let Pass::Acquired(lease) = pass.enter().await.unwrap() else {
        panic!("expected to own the lease");
    };

    let owner = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cached.set("k", &42u32, None).await.unwrap();
        lease.release().await.unwrap();
    };
    let waiter = cached.get_or_create(
        "k",
        || async { Ok::<_, CorralError>(Some(0u32)) },
        None,
    );

    let ((), value) = tokio::join!(owner, waiter);
    assert_eq!(value.unwrap(), Some(42));
}

#[tokio::test(start_paused = true)]
async fn test_waiter_times_out_with_none() {
    let cache = Arc::new(MemoryCache::new());
    let cached = Cached::new(Arc::clone(&cache)).with_timeout(Duration::from_secs(1));
    let pass = OnePass::new(Arc::clone(&cache), "one_pass:k", Duration::from_secs(60), None)
        .enter()
        .await
        .unwrap();
    assert!(pass.acquired());

    let calls = AtomicUsize::new(0);
    let started = tokio::time::Instant::now();
    let value: Option<u32> = cached
        .get_or_create(
            "k",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CorralError>(Some(1))
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(value, None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(started.elapsed() >= Duration::from_secs(1));
    drop(pass);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_owner_frees_lease() {
    let cache = Arc::new(MemoryCache::new());
    let cached = Cached::new(Arc::clone(&cache));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(100),
        cached.get_or_create(
            "k",
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, CorralError>(Some(1u32))
            },
            None,
        ),
    )
    .await;
    assert!(cancelled.is_err());

    // Let the background delete run.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!cache.contains_key("one_pass:k", None));

    let started = tokio::time::Instant::now();
    let value: Option<u32> = cached
        .get_or_create("k", || async { Ok::<_, CorralError>(Some(2)) }, None)
        .await
        .unwrap();
    assert_eq!(value, Some(2));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_owner_releases_lease_when_nothing_to_cache() {
    let cache = Arc::new(RecordingCache::new());
    let cached = Cached::from_config(Arc::clone(&cache), &fast_cached_config()).unwrap();

    let value: Option<u32> = cached
        .one_pass_create("k", || async { Ok::<_, CorralError>(None) }, None)
        .await
        .unwrap();
    assert_eq!(value, None);

    let ops: Vec<&str> = cache.calls().iter().map(|c| c.op).collect();
    assert_eq!(ops, vec!["add", "delete"]);
    assert!(cache.inner().is_empty());
}

#[tokio::test]
async fn test_lost_add_race_still_returns_computed_value() {
    let cache = Arc::new(RecordingCache::new());
    let cached = Cached::new(Arc::clone(&cache));
    cache.force_add(Some(false));

    let value: Option<String> = cached
        .get_or_add(
            "k",
            || async { Ok::<_, CorralError>(Some("mine".to_string())) },
            None,
        )
        .await
        .unwrap();

    assert_eq!(value.as_deref(), Some("mine"));
    assert_eq!(cache.get("k", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_port_outage_propagates() {
    let cache = Arc::new(RecordingCache::new());
    let cached = Cached::new(Arc::clone(&cache));
    cache.set_unavailable(true);

    let result = cached
        .get_or_set("k", || async { Ok::<_, CorralError>(Some(1u32)) }, None)
        .await;
    assert_unavailable(&result);
}

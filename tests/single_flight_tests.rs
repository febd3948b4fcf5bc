use flightcache::{Cache, CacheError, CacheOptions, CallOptions, CancellationToken, ExpiresAt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn cache(max_cache_time: Duration, max_error_time: Duration) -> Arc<Cache<String, String>> {
    Arc::new(Cache::new(
        CacheOptions::default()
            .with_max_cache_time(max_cache_time)
            .with_max_error_time(max_error_time),
    ))
}

#[tokio::test]
async fn test_concurrent_callers_share_one_run() {
    let cache = cache(Duration::from_secs(60), Duration::from_secs(1));
    let runs = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create("report", move |_| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(30)).await;
                        Ok("done".to_string())
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "done");
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_keys_run_in_parallel() {
    let cache = cache(Duration::from_secs(60), Duration::from_secs(1));
    let started = std::time::Instant::now();

    let slow = |value: &'static str| {
        move |_: CancellationToken| async move {
            sleep(Duration::from_millis(100)).await;
            Ok(value.to_string())
        }
    };
    let (a, b) = tokio::join!(
        cache.get_or_create("a", slow("a")),
        cache.get_or_create("b", slow("b")),
    );

    assert_eq!(a.unwrap(), "a");
    assert_eq!(b.unwrap(), "b");
    assert!(started.elapsed() < Duration::from_millis(190));
}

#[tokio::test]
async fn test_results_and_errors_expire_separately() {
    let cache = cache(Duration::from_millis(300), Duration::from_millis(40));

    let err = cache
        .get_or_create("e", |_| async { Err("boom".to_string()) })
        .await
        .unwrap_err();
    assert_eq!(err.into_factory().as_deref(), Some("boom"));

    cache.set_value("r", "kept".to_string()).await.unwrap();
    sleep(Duration::from_millis(80)).await;

    // The error is gone, the result is still served.
    let retried = cache
        .get_or_create("e", |_| async { Ok("recovered".to_string()) })
        .await
        .unwrap();
    assert_eq!(retried, "recovered");

    let cached = cache
        .get_or_create("r", |_| async { Ok("replaced".to_string()) })
        .await
        .unwrap();
    assert_eq!(cached, "kept");
}

#[tokio::test]
async fn test_set_overwrites_valid_entry() {
    let cache = cache(Duration::from_secs(60), Duration::from_secs(1));
    cache.set_value("k", "first".to_string()).await.unwrap();

    let value = cache
        .set("k", |_| async { Ok("second".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "second");
    assert_eq!(cache.peek("k").await.unwrap(), Some(Ok("second".to_string())));
}

#[tokio::test]
async fn test_expires_at_from_result() {
    let cache = cache(Duration::from_secs(60), Duration::from_secs(1));
    let options = CallOptions::new().expires_at(ExpiresAt::from_fn(|token: &String| {
        // Tokens carry their own expiry.
        token.trim_start_matches("token-").parse().unwrap_or(0)
    }));

    cache
        .get_or_create_with("token", |_| async { Ok("token-1".to_string()) }, options)
        .await
        .unwrap();

    // Expired at 1 ms after the epoch, so never stored.
    assert_eq!(cache.peek("token").await.unwrap(), None);
}

#[tokio::test]
async fn test_cancelled_waiter_leaves_running_call_alone() {
    let cache = cache(Duration::from_secs(60), Duration::from_secs(1));
    let cancel = CancellationToken::new();

    let running = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("k", |_| async {
                    sleep(Duration::from_millis(80)).await;
                    Ok("owner".to_string())
                })
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;

    let waiter = {
        let cache = cache.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cache
                .get_or_create_with(
                    "k",
                    |_| async { Ok("waiter".to_string()) },
                    CallOptions::new().cancel(cancel),
                )
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    assert!(matches!(waiter.await.unwrap(), Err(CacheError::Aborted)));
    assert_eq!(running.await.unwrap().unwrap(), "owner");
    assert_eq!(cache.peek("k").await.unwrap(), Some(Ok("owner".to_string())));
}

#[cfg(feature = "stats")]
#[tokio::test]
async fn test_stats_count_hits_and_misses() {
    let cache = cache(Duration::from_secs(60), Duration::from_secs(1));
    for _ in 0..3 {
        cache
            .get_or_create("k", |_| async { Ok("v".to_string()) })
            .await
            .unwrap();
    }
    assert_eq!(cache.stats().misses(), 1);
    assert_eq!(cache.stats().hits(), 2);
}

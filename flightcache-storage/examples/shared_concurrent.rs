//! # Shared Concurrent Cache Example
//!
//! Several `StorageCache` values opened over the same session store, used from
//! many tasks at once. The expensive computation runs once per key no matter
//! which cache or task asks first.

use flightcache_core::ErrorMessage;
use flightcache_storage::{StorageCache, StorageCacheOptions, StorageScope};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

static EXEC_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Simulates an expensive async computation
async fn fibonacci(n: u32) -> Result<u64, ErrorMessage> {
    EXEC_COUNT.fetch_add(1, Ordering::SeqCst);
    println!("Computing fibonacci({}) on thread {:?}", n, std::thread::current().id());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a + b);
    }
    Ok(a)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Shared Concurrent Cache Example ===\n");

    let options = StorageCacheOptions::default()
        .with_storage(StorageScope::Session)
        .with_max_cache_time(Duration::from_secs(60));

    let mut tasks = JoinSet::new();
    println!("Spawning 10 tasks over 3 caches (each computing fib(20) and fib(25))...\n");

    let mut caches = Vec::new();
    for _ in 0..3 {
        let cache: StorageCache<u64, ErrorMessage> = StorageCache::open(options.clone()).await?;
        caches.push(Arc::new(cache));
    }

    for i in 0..10 {
        let cache = caches[i % caches.len()].clone();
        tasks.spawn(async move {
            let a = cache.get_or_create("fib:20", |_| fibonacci(20)).await?;
            let b = cache.get_or_create("fib:25", |_| fibonacci(25)).await?;
            println!("Task {} finished: fib(20)={}, fib(25)={}", i, a, b);
            Ok::<_, flightcache_core::CacheError<ErrorMessage>>((a, b))
        });
    }

    while let Some(result) = tasks.join_next().await {
        assert_eq!(result??, (6765, 75025));
    }

    let exec_count = EXEC_COUNT.load(Ordering::SeqCst);
    println!("\n--- Results ---");
    println!("Total function executions: {}", exec_count);
    println!("Storage id: {}", caches[0].storage_id().await?);
    assert_eq!(exec_count, 2);

    println!("\n✅ Every key was computed exactly once");
    Ok(())
}

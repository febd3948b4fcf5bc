//! # Expiry and Eviction Example
//!
//! A file-backed cache with a tiny quota. Results expire quickly, errors even
//! faster, and a write that does not fit sweeps the expired records first.

use flightcache_core::{CallOptions, ErrorMessage, ExpiresAt, Storage};
use flightcache_storage::{StorageCache, StorageCacheOptions, StorageScope};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Expiry and Eviction Example ===\n");

    let dir = tempfile::tempdir()?;
    let options = StorageCacheOptions::default()
        .with_storage(StorageScope::LocalAt(dir.path().to_path_buf()))
        .with_quota_bytes(Some(1024))
        .with_max_cache_time(Duration::from_millis(200))
        .with_max_error_time(Duration::from_millis(50));
    let cache: StorageCache<String, ErrorMessage> = StorageCache::open(options).await?;

    // Errors are cached too, for max_error_time.
    if let Err(err) = cache
        .get_or_create("flaky", |_| async { Err(ErrorMessage::new("upstream timeout")) })
        .await
    {
        println!("First call failed: {}", err);
    }

    tokio::time::sleep(Duration::from_millis(60)).await;
    let ok = cache
        .get_or_create("flaky", |_| async { Ok("recovered".to_string()) })
        .await?;
    println!("After the error expired: {}", ok);

    // Fill the quota with short-lived records.
    let mut written = 0;
    while cache.set_value(&format!("page:{written}"), "x".repeat(150)).await.is_ok() {
        written += 1;
    }
    println!("Quota full after {} pages", written);

    tokio::time::sleep(Duration::from_millis(250)).await;

    // This write does not fit, so expired pages are swept before retrying.
    let pinned = cache
        .set_with(
            "pinned",
            |_| async { Ok("y".repeat(150)) },
            CallOptions::new().expires_at(ExpiresAt::after(Duration::from_secs(3600))),
        )
        .await?;
    println!("Stored pinned value of {} bytes", pinned.len());
    println!("Keys left: {:?}", cache.storage().get_keys().await?);

    println!("Evictions: {}", cache.stats().evictions());

    Ok(())
}

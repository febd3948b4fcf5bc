//! # Flightcache
//!
//! An async cache that runs at most one factory per key at a time, stores
//! results and errors with separate expiration times, and recovers from a full
//! storage backend by sweeping expired entries.
//!
//! ## Features
//!
//! - **Single-flight**: concurrent callers for one key share one factory run
//! - **Error caching**: errors are cached for `max_error_time`, results for `max_cache_time`
//! - **Pluggable storage**: implement [`Storage`] or use [`MemoryStorage`] and
//!   [`PersistentStorage`] over a [`MemoryStore`] or [`FileStore`]
//! - **Pluggable mutexes**: implement [`CacheMutex`] or use [`LocalMutex`] and
//!   [`DistributedMutex`]
//! - **Eviction on pressure**: [`StorageError::NotEnoughSpace`] triggers a sweep and a retry
//! - **Cancellation**: pass a [`CancellationToken`] through [`CallOptions`]
//!
//! ## Quick Start
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use flightcache::prelude::*;
//! use std::time::Duration;
//!
//! let cache: Cache<String, String> = Cache::new(
//!     CacheOptions::default()
//!         .with_max_cache_time(Duration::from_secs(60))
//!         .with_max_error_time(Duration::from_secs(1)),
//! );
//!
//! let user = cache
//!     .get_or_create("user:1", |_cancel| async { Ok("alice".to_string()) })
//!     .await
//!     .unwrap();
//! assert_eq!(user, "alice");
//! # });
//! ```
//!
//! ## Cancellation
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use flightcache::prelude::*;
//!
//! let cache: Cache<u32, String> = Cache::default();
//! let cancel = CancellationToken::new();
//! cancel.cancel();
//!
//! let err = cache
//!     .get_or_create_with("k", |_| async { Ok(1) }, CallOptions::new().cancel(cancel))
//!     .await
//!     .unwrap_err();
//! assert!(err.is_aborted());
//! # });
//! ```
//!
//! ## Shared caches
//!
//! A [`StorageCache`] keeps entries in a [`KeyValueStore`] and locks by the
//! store's instance id, so every cache opened over the same store coordinates:
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use flightcache::prelude::*;
//!
//! let options = StorageCacheOptions::default().with_storage(StorageScope::Session);
//! let first: StorageCache<u32, ErrorMessage> = StorageCache::open(options.clone()).await.unwrap();
//! let second: StorageCache<u32, ErrorMessage> = StorageCache::open(options).await.unwrap();
//!
//! first.set_value("doc:shared", 3).await.unwrap();
//! let seen = second.get_or_create("doc:shared", |_| async { Ok(4) }).await.unwrap();
//! assert_eq!(seen, 3);
//! # });
//! ```

pub use flightcache_core::{
    Cache, CacheConfig, CacheError, CacheMutex, CacheOptions, CallOptions, CancellationToken,
    Entry, ErrorMessage, ExpiresAt, LocalMutex, LocalMutexFactory, LockError, MemoryStorage,
    MutexFactory, MutexGuard, Storage, StorageError, DEFAULT_MAX_CACHE_TIME,
    DEFAULT_MAX_ERROR_TIME,
};

#[cfg(feature = "stats")]
pub use flightcache_core::CacheStats;

pub use flightcache_storage::{
    decode_entry, decode_expiry, encode_entry, DistributedMutex, DistributedMutexFactory,
    FileStore, KeyValueStore, LocalLockManager, LockManager, LockMode, MemoryStore,
    PersistentStorage, StorageCache, StorageCacheOptions, StorageId, StorageScope, StoreError,
    DEFAULT_QUOTA_BYTES, ENTRY_PREFIX,
};

/// Everything needed for typical use.
pub mod prelude {
    pub use crate::{
        Cache, CacheError, CacheOptions, CallOptions, CancellationToken, ErrorMessage, ExpiresAt,
        StorageCache, StorageCacheOptions, StorageScope,
    };
}

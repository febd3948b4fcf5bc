//! # Flightcache Storage
//!
//! Persistent backends for [`flightcache_core::Cache`].
//!
//! A [`StorageCache`] keeps its entries as JSON records in a [`KeyValueStore`]
//! and locks through named locks that carry the store's instance id. Several
//! caches opened over the same store therefore share entries and coalesce work
//! with each other, not only within one cache value.
//!
//! ## Features
//!
//! - **Stores**: in-memory [`MemoryStore`] (with a process-wide session store)
//!   and file-backed [`FileStore`], both with optional byte quotas
//! - **Quota recovery**: a full store is reported as
//!   [`StorageError::NotEnoughSpace`](flightcache_core::StorageError::NotEnoughSpace),
//!   so the cache sweeps expired records and retries
//! - **Shared locks**: [`DistributedMutex`] names locks `"<key>__<storage id>"`
//!
//! ## Quick Start
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use flightcache_core::ErrorMessage;
//! use flightcache_storage::{StorageCache, StorageCacheOptions, StorageScope};
//! use std::time::Duration;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let options = StorageCacheOptions::default()
//!     .with_storage(StorageScope::LocalAt(dir.path().to_path_buf()))
//!     .with_max_cache_time(Duration::from_secs(60));
//!
//! let cache: StorageCache<u64, ErrorMessage> = StorageCache::open(options).await.unwrap();
//! let n = cache.get_or_create("n", |_| async { Ok(7) }).await.unwrap();
//! assert_eq!(n, 7);
//! # });
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - Key/value store trait and the in-memory store
//! - [`file_store`] - One-file-per-key store
//! - [`persistent`] - Entry records and the `Storage` adapter
//! - [`lock`] - Named lock managers
//! - [`storage_id`] - Per-store instance id
//! - [`distributed`] - Mutexes over named locks
//! - [`storage_cache`] - The assembled cache
//!
pub mod distributed;
pub mod file_store;
pub mod lock;
pub mod persistent;
pub mod storage_cache;
pub mod storage_id;
pub mod store;

pub use distributed::{DistributedMutex, DistributedMutexFactory};
pub use file_store::FileStore;
pub use lock::{LocalLockManager, LockManager, LockMode};
pub use persistent::{
    decode_entry, decode_expiry, encode_entry, PersistentStorage, ENTRY_PREFIX,
};
pub use storage_cache::{StorageCache, StorageCacheOptions, StorageScope};
pub use storage_id::{StorageId, STORAGE_ID_KEY, STORAGE_ID_LOCK};
pub use store::{KeyValueStore, MemoryStore, StoreError, DEFAULT_QUOTA_BYTES};

//! # Flightcache Core
//!
//! Core types of the flightcache library: an async cache that coalesces
//! concurrent work per key and stores results and errors with expiration.
//!
//! ## Features
//!
//! - **Single-flight**: concurrent callers for one key share one factory run
//! - **Separate expiration**: results live for `max_cache_time`, errors for `max_error_time`
//! - **Pluggable storage**: [`Storage`] trait with an in-memory default
//! - **Pluggable mutexes**: [`CacheMutex`] trait with shared and exclusive modes
//! - **Eviction on pressure**: a full storage triggers a sweep of expired entries and a retry
//! - **Cancellation**: every call accepts a `CancellationToken`
//!
//! ## Module Organization
//!
//! - [`entry`] - The stored unit: a result or an error with timestamps
//! - [`storage`] - Storage trait and the in-memory backend
//! - [`mutex`] - Mutex trait, in-process mutex and mutex factories
//! - [`cache`] - The cache itself
//! - [`options`] - Cache and per-call options, loadable configuration
//! - [`error`] - Error types
//!
pub mod cache;
pub mod entry;
pub mod error;
pub mod mutex;
pub mod options;
pub mod storage;
pub mod utils;

#[cfg(feature = "stats")]
mod stats;

pub use cache::Cache;
pub use entry::Entry;
pub use error::{CacheError, ErrorMessage, LockError, StorageError};
pub use mutex::{CacheMutex, LocalMutex, LocalMutexFactory, MutexFactory, MutexGuard};
pub use options::{
    CacheConfig, CacheOptions, CallOptions, ExpiresAt, DEFAULT_MAX_CACHE_TIME,
    DEFAULT_MAX_ERROR_TIME,
};
pub use storage::{MemoryStorage, Storage};

#[cfg(feature = "stats")]
pub use stats::CacheStats;

pub use tokio_util::sync::CancellationToken;

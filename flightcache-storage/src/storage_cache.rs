use crate::distributed::DistributedMutexFactory;
use crate::file_store::FileStore;
use crate::lock::{LocalLockManager, LockManager};
use crate::persistent::PersistentStorage;
use crate::storage_id::StorageId;
use crate::store::{KeyValueStore, MemoryStore, DEFAULT_QUOTA_BYTES};
use flightcache_core::{
    Cache, CacheConfig, CacheOptions, ErrorMessage, LockError, StorageError,
    DEFAULT_MAX_CACHE_TIME, DEFAULT_MAX_ERROR_TIME,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{self, Display};
use std::io;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Where a [`StorageCache`] keeps its records.
#[derive(Clone, Default)]
pub enum StorageScope {
    /// Files under the user's local data directory (`<data dir>/flightcache`).
    #[default]
    Local,
    /// Files under the given directory.
    LocalAt(PathBuf),
    /// The process-wide in-memory store, see [`MemoryStore::session`].
    Session,
    /// Any other store.
    Custom(Arc<dyn KeyValueStore>),
}

impl fmt::Debug for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageScope::Local => f.write_str("Local"),
            StorageScope::LocalAt(dir) => f.debug_tuple("LocalAt").field(dir).finish(),
            StorageScope::Session => f.write_str("Session"),
            StorageScope::Custom(_) => f.write_str("Custom(<KeyValueStore>)"),
        }
    }
}

/// Options for [`StorageCache::open`].
#[derive(Clone)]
pub struct StorageCacheOptions {
    pub max_cache_time: Duration,
    pub max_error_time: Duration,
    pub storage: StorageScope,
    /// Byte quota for file-backed scopes; `None` means unbounded.
    pub quota_bytes: Option<usize>,
    /// Lock manager; the process-wide [`LocalLockManager`] when unset.
    pub lock_manager: Option<Arc<dyn LockManager>>,
}

impl StorageCacheOptions {
    pub fn with_max_cache_time(mut self, max_cache_time: Duration) -> Self {
        self.max_cache_time = max_cache_time;
        self
    }

    pub fn with_max_error_time(mut self, max_error_time: Duration) -> Self {
        self.max_error_time = max_error_time;
        self
    }

    pub fn with_storage(mut self, storage: StorageScope) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_quota_bytes(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn with_lock_manager(mut self, lock_manager: Arc<dyn LockManager>) -> Self {
        self.lock_manager = Some(lock_manager);
        self
    }

    /// Applies the durations of a loaded [`CacheConfig`].
    pub fn with_config(self, config: &CacheConfig) -> Self {
        self.with_max_cache_time(config.max_cache_time)
            .with_max_error_time(config.max_error_time)
    }
}

impl Default for StorageCacheOptions {
    fn default() -> Self {
        Self {
            max_cache_time: DEFAULT_MAX_CACHE_TIME,
            max_error_time: DEFAULT_MAX_ERROR_TIME,
            storage: StorageScope::default(),
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
            lock_manager: None,
        }
    }
}

impl fmt::Debug for StorageCacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCacheOptions")
            .field("max_cache_time", &self.max_cache_time)
            .field("max_error_time", &self.max_error_time)
            .field("storage", &self.storage)
            .field("quota_bytes", &self.quota_bytes)
            .finish_non_exhaustive()
    }
}

/// A [`Cache`] whose entries live in a [`KeyValueStore`] and whose mutexes are
/// named locks shared with every other cache over the same store.
///
/// It adds no cache semantics of its own; all operations come from [`Cache`]
/// through `Deref`.
///
/// # Type Parameters
///
/// * `T` - Result type, stored as JSON
/// * `E` - Error type; only its message is stored and it is rebuilt through
///   `From<ErrorMessage>`
///
/// # Examples
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// use flightcache_core::ErrorMessage;
/// use flightcache_storage::{MemoryStore, StorageCache, StorageCacheOptions, StorageScope};
/// use std::sync::Arc;
///
/// let options = StorageCacheOptions::default()
///     .with_storage(StorageScope::Custom(Arc::new(MemoryStore::new())));
/// let cache: StorageCache<String, ErrorMessage> = StorageCache::open(options).await.unwrap();
///
/// let greeting = cache
///     .get_or_create("greeting", |_| async { Ok("hello".to_string()) })
///     .await
///     .unwrap();
/// assert_eq!(greeting, "hello");
/// # });
/// ```
pub struct StorageCache<T, E> {
    cache: Cache<T, E>,
    store: Arc<dyn KeyValueStore>,
    storage_id: Arc<StorageId>,
}

impl<T, E> StorageCache<T, E>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Clone + Display + From<ErrorMessage> + Send + Sync + 'static,
{
    /// Opens the store selected by `options.storage` and builds the cache.
    ///
    /// Fails only if a file-backed scope cannot create its directory.
    pub async fn open(options: StorageCacheOptions) -> Result<Self, StorageError> {
        let store: Arc<dyn KeyValueStore> = match &options.storage {
            StorageScope::Local => {
                Arc::new(FileStore::open(default_local_dir()?, options.quota_bytes).await?)
            }
            StorageScope::LocalAt(dir) => {
                Arc::new(FileStore::open(dir.clone(), options.quota_bytes).await?)
            }
            StorageScope::Session => MemoryStore::session(),
            StorageScope::Custom(store) => store.clone(),
        };
        debug!(scope = ?options.storage, "opened storage cache");
        Ok(Self::with_store(store, options))
    }

    /// Builds the cache over an already opened store. `options.storage` is ignored.
    pub fn with_store(store: Arc<dyn KeyValueStore>, options: StorageCacheOptions) -> Self {
        let locks: Arc<dyn LockManager> = match options.lock_manager {
            Some(locks) => locks,
            None => LocalLockManager::global(),
        };
        let storage_id = Arc::new(StorageId::new(store.clone(), locks.clone()));

        let cache = Cache::new(
            CacheOptions::default()
                .with_max_cache_time(options.max_cache_time)
                .with_max_error_time(options.max_error_time)
                .with_storage(Arc::new(PersistentStorage::new(store.clone())))
                .with_mutex_factory(Arc::new(DistributedMutexFactory::new(
                    storage_id.clone(),
                    locks,
                ))),
        );

        Self {
            cache,
            store,
            storage_id,
        }
    }

    /// The id shared by every cache over this store.
    pub async fn storage_id(&self) -> Result<String, LockError> {
        self.storage_id.get().await.map(str::to_string)
    }

    /// The underlying key/value store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// The wrapped cache.
    pub fn cache(&self) -> &Cache<T, E> {
        &self.cache
    }
}

impl<T, E> Deref for StorageCache<T, E> {
    type Target = Cache<T, E>;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl<T, E> fmt::Debug for StorageCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCache")
            .field("cache", &self.cache)
            .field("storage_id", &self.storage_id)
            .finish_non_exhaustive()
    }
}

fn default_local_dir() -> Result<PathBuf, StorageError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("flightcache"))
        .ok_or_else(|| {
            StorageError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no local data directory for this user",
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent::decode_entry;
    use flightcache_core::{CacheError, CallOptions, ExpiresAt};
    use serde_json::Value;
    use serial_test::serial;
    use tempfile::TempDir;

    fn isolated(store: Arc<dyn KeyValueStore>) -> StorageCacheOptions {
        StorageCacheOptions::default()
            .with_storage(StorageScope::Custom(store))
            .with_lock_manager(Arc::new(LocalLockManager::new()))
    }

    #[tokio::test]
    async fn test_result_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let cache: StorageCache<Vec<String>, ErrorMessage> =
            StorageCache::open(isolated(store.clone())).await.unwrap();

        let value = vec!["a".to_string(), "b".to_string()];
        let expected = value.clone();
        cache
            .get_or_create("list", move |_| async move { Ok(value) })
            .await
            .unwrap();

        let text = store.get_item("flightcache:entry:list").await.unwrap().unwrap();
        let record: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(record["result"], serde_json::json!(["a", "b"]));

        let entry = decode_entry::<Vec<String>, ErrorMessage>(&text).unwrap();
        assert_eq!(entry.result(), Some(&expected));
    }

    #[tokio::test]
    #[serial]
    async fn test_error_round_trips_as_message() {
        let store = Arc::new(MemoryStore::new());
        let options = isolated(store.clone()).with_max_error_time(Duration::from_secs(60));
        let cache: StorageCache<u32, ErrorMessage> = StorageCache::open(options).await.unwrap();

        let err = cache
            .get_or_create("k", |_| async { Err(ErrorMessage::new("backend down")) })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Factory(ref e) if e.message() == "backend down"));

        let text = store.get_item("flightcache:entry:k").await.unwrap().unwrap();
        let record: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(record["error"], "backend down");

        // A second cache over the same store sees the cached error.
        let other: StorageCache<u32, ErrorMessage> =
            StorageCache::with_store(store, StorageCacheOptions::default());
        let err = other
            .get_or_create("k", |_| async { Ok(1) })
            .await
            .unwrap_err();
        assert_eq!(err.into_factory().unwrap().message(), "backend down");
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_entries_of_other_types() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let locks: Arc<dyn LockManager> = Arc::new(LocalLockManager::new());
        let options = |max_cache_time| {
            StorageCacheOptions::default()
                .with_lock_manager(locks.clone())
                .with_max_cache_time(max_cache_time)
        };

        let names: StorageCache<String, ErrorMessage> =
            StorageCache::with_store(store.clone(), options(Duration::from_secs(60)));
        let counters: StorageCache<u32, ErrorMessage> =
            StorageCache::with_store(store, options(Duration::from_millis(10)));

        names.set_value("name", "ada".to_string()).await.unwrap();
        counters.set_value("hits", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Only the expired counter goes; the string record is live.
        assert_eq!(counters.sweep_expired().await.unwrap(), 1);
        assert_eq!(names.peek("name").await.unwrap(), Some(Ok("ada".to_string())));
        assert_eq!(counters.peek("hits").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_caches_over_one_store_share_id_and_entries() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let locks: Arc<dyn LockManager> = Arc::new(LocalLockManager::new());
        let options = || StorageCacheOptions::default().with_lock_manager(locks.clone());

        let first: StorageCache<u32, ErrorMessage> =
            StorageCache::with_store(store.clone(), options());
        let second: StorageCache<u32, ErrorMessage> = StorageCache::with_store(store, options());

        assert_eq!(
            first.storage_id().await.unwrap(),
            second.storage_id().await.unwrap()
        );

        first.set_value("k", 5).await.unwrap();
        let value = second
            .get_or_create("k", |_| async { Ok(6) })
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_full_store_sweeps_expired_records() {
        let store = Arc::new(MemoryStore::with_quota(500));
        let options = isolated(store.clone()).with_max_cache_time(Duration::from_millis(10));
        let cache: StorageCache<String, ErrorMessage> = StorageCache::open(options).await.unwrap();

        for key in ["a", "b", "c"] {
            cache.set_value(key, "x".repeat(60)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Does not fit next to the three expired records.
        let long = "y".repeat(200);
        let value = cache
            .set_with(
                "d",
                move |_| async move { Ok(long) },
                CallOptions::new().expires_at(ExpiresAt::after(Duration::from_secs(60))),
            )
            .await
            .unwrap();
        assert_eq!(value.len(), 200);

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["flightcache:entry:d", "flightcache:storage-id"]);
    }

    #[tokio::test]
    async fn test_local_scope_persists_to_directory() {
        let dir = TempDir::new().unwrap();
        let options = || {
            StorageCacheOptions::default()
                .with_storage(StorageScope::LocalAt(dir.path().to_path_buf()))
                .with_lock_manager(Arc::new(LocalLockManager::new()))
        };

        {
            let cache: StorageCache<u32, ErrorMessage> =
                StorageCache::open(options()).await.unwrap();
            cache.set_value("k", 11).await.unwrap();
        }

        let reopened: StorageCache<u32, ErrorMessage> =
            StorageCache::open(options()).await.unwrap();
        assert_eq!(reopened.peek("k").await.unwrap(), Some(Ok(11)));
    }

    #[tokio::test]
    #[serial]
    async fn test_session_scope_shares_process_store() {
        MemoryStore::session().clear();
        let options = StorageCacheOptions::default().with_storage(StorageScope::Session);
        let first: StorageCache<u32, ErrorMessage> =
            StorageCache::open(options.clone()).await.unwrap();
        let second: StorageCache<u32, ErrorMessage> = StorageCache::open(options).await.unwrap();

        first.set_value("visits", 5).await.unwrap();
        assert_eq!(second.peek("visits").await.unwrap(), Some(Ok(5)));
        assert_eq!(
            first.storage_id().await.unwrap(),
            second.storage_id().await.unwrap()
        );

        second.remove("visits").await.unwrap();
        assert_eq!(first.peek("visits").await.unwrap(), None);
        MemoryStore::session().clear();
    }
}

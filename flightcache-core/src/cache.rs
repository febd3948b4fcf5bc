#[cfg(feature = "stats")]
use crate::CacheStats;
use crate::error::{CacheError, LockError, StorageError};
use crate::mutex::{CacheMutex, MutexFactory, MutexGuard};
use crate::options::{CacheOptions, CallOptions, ExpiresAt};
use crate::storage::Storage;
use crate::utils::{millis_after, now_millis};
use crate::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// An async cache that runs at most one factory per key at a time.
///
/// Given a key and a factory, [`get_or_create`](Cache::get_or_create) returns
/// the stored result while it is valid and otherwise runs the factory, stores
/// what it produced (result or error) with an expiration time, and returns it.
///
/// # Type Parameters
///
/// * `T` - The type of successful results. Must implement `Clone`.
/// * `E` - The type of factory errors. Must implement `Clone`; errors are cached too.
///
/// # Locking
///
/// Every operation holds the global mutex in shared mode and, inside it, the
/// mutex of its key in exclusive mode. Callers that arrive while a factory is
/// running for their key wait for it and then observe the entry it wrote.
///
/// When the storage reports [`StorageError::NotEnoughSpace`] the cache takes the
/// global mutex exclusively, deletes every expired entry in the storage, and
/// retries the write. The capacity error itself never reaches the caller unless
/// the retry hits it again.
///
/// Factories must not call back into the same cache: a sweep queued for the
/// global mutex blocks new shared holders, so the nested call would wait on
/// the outer one.
///
/// Per-key mutexes are created on first use and dropped again as soon as no
/// operation holds or awaits them, so the cache keeps at most one mutex per
/// key in flight.
///
/// # Expiration
///
/// * Results expire after `max_cache_time` unless the call passes an
///   [`ExpiresAt`].
/// * Errors expire after `max_error_time`.
/// * An entry that is already expired when it is built is returned but not
///   written.
///
/// # Examples
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// use flightcache_core::Cache;
///
/// let cache: Cache<u64, String> = Cache::default();
///
/// let value = cache
///     .get_or_create("answer", |_cancel| async { Ok(42) })
///     .await
///     .unwrap();
/// assert_eq!(value, 42);
///
/// // The stored value is returned without running the factory again.
/// let again = cache
///     .get_or_create("answer", |_cancel| async { Err("not called".to_string()) })
///     .await
///     .unwrap();
/// assert_eq!(again, 42);
/// # });
/// ```
pub struct Cache<T, E> {
    max_cache_time: Duration,
    max_error_time: Duration,
    mutex_factory: Arc<dyn MutexFactory>,
    storage: Arc<dyn Storage<T, E>>,

    /// Per-key mutexes of the operations in flight
    mutexes: DashMap<String, Arc<dyn CacheMutex>>,

    /// Global mutex, created on first use
    global: OnceCell<Arc<dyn CacheMutex>>,

    #[cfg(feature = "stats")]
    stats: CacheStats,
}

/// What the locked part of an operation produced.
enum Attempt<T, E> {
    Done(Entry<T, E>),
    /// The entry was built but the storage had no room for it.
    NoSpace(Entry<T, E>),
}

impl<T, E> Cache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// The error a custom [`Storage::set_entry`] returns to start an eviction sweep.
    pub const NOT_ENOUGH_SPACE_ERROR: StorageError = StorageError::NotEnoughSpace;

    pub fn new(options: CacheOptions<T, E>) -> Self {
        let CacheOptions {
            max_cache_time,
            max_error_time,
            mutex_factory,
            storage,
        } = options;

        Self {
            max_cache_time,
            max_error_time,
            mutex_factory,
            storage,
            mutexes: DashMap::new(),
            global: OnceCell::new(),
            #[cfg(feature = "stats")]
            stats: CacheStats::new(),
        }
    }

    /// Returns the valid result for `key`, running `factory` when there is none.
    ///
    /// The factory receives a cancellation token and is only run if the stored
    /// entry is absent or expired. A cached or fresh factory error is returned as
    /// [`CacheError::Factory`].
    pub async fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> Result<T, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        self.get_or_create_with(key, factory, CallOptions::default())
            .await
    }

    /// [`get_or_create`](Self::get_or_create) with a cancellation token and/or an
    /// explicit expiration.
    ///
    /// A cancelled call returns [`CacheError::Aborted`] and writes nothing; other
    /// callers waiting on the same key are not affected.
    pub async fn get_or_create_with<F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: CallOptions<T>,
    ) -> Result<T, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let entry = self.raw_set(key, factory, false, options).await?;
        entry.into_outcome().map_err(CacheError::Factory)
    }

    /// Runs `factory` and stores its outcome, regardless of the current entry.
    pub async fn set<F, Fut>(&self, key: &str, factory: F) -> Result<T, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        self.set_with(key, factory, CallOptions::default()).await
    }

    /// [`set`](Self::set) with a cancellation token and/or an explicit expiration.
    pub async fn set_with<F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: CallOptions<T>,
    ) -> Result<T, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let entry = self.raw_set(key, factory, true, options).await?;
        entry.into_outcome().map_err(CacheError::Factory)
    }

    /// Stores a plain value for `key`.
    pub async fn set_value(&self, key: &str, value: T) -> Result<T, CacheError<E>> {
        self.set(key, move |_| std::future::ready(Ok(value))).await
    }

    /// Returns the outcome stored for `key` if it is still valid.
    ///
    /// Never runs a factory and never writes.
    pub async fn peek(&self, key: &str) -> Result<Option<Result<T, E>>, CacheError<E>> {
        let key_mutex = self.key_mutex(key);
        let _shared = self.global_mutex().lock_shared().await?;
        let _exclusive = key_mutex.lock_exclusive().await?;

        let entry = self.storage.get_entry(key).await?;
        Ok(entry
            .filter(|entry| !entry.is_expired(now_millis()))
            .map(Entry::into_outcome))
    }

    /// Deletes the entry stored for `key`.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError<E>> {
        let key_mutex = self.key_mutex(key);
        let _shared = self.global_mutex().lock_shared().await?;
        let _exclusive = key_mutex.lock_exclusive().await?;

        self.storage.delete_entry(key).await?;
        debug!(key, "entry removed");
        Ok(())
    }

    /// Deletes every expired entry in the storage and returns how many were removed.
    ///
    /// This is the same sweep that runs when the storage is full.
    pub async fn sweep_expired(&self) -> Result<usize, CacheError<E>> {
        let _exclusive = self.global_mutex().lock_exclusive().await?;
        Ok(self.sweep_locked().await?)
    }

    pub fn max_cache_time(&self) -> Duration {
        self.max_cache_time
    }

    pub fn max_error_time(&self) -> Duration {
        self.max_error_time
    }

    /// The backend this cache writes to.
    pub fn storage(&self) -> &Arc<dyn Storage<T, E>> {
        &self.storage
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    async fn raw_set<F, Fut>(
        &self,
        key: &str,
        factory: F,
        bypass_expiration: bool,
        options: CallOptions<T>,
    ) -> Result<Entry<T, E>, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let CallOptions { cancel, expires_at } = options;
        let cancel = cancel.unwrap_or_default();

        let key_mutex = self.key_mutex(key);
        let global = self.global_mutex();

        let attempt = {
            let _shared = Self::acquire(global.lock_shared(), &cancel).await?;
            let _exclusive = Self::acquire(key_mutex.lock_exclusive(), &cancel).await?;
            self.resolve(key, factory, bypass_expiration, &cancel, expires_at)
                .await?
        };

        match attempt {
            Attempt::Done(entry) => Ok(entry),
            Attempt::NoSpace(entry) => self.evict_and_commit(key, entry, &global).await,
        }
    }

    /// Reads, recomputes if needed, and writes one key. Runs under both locks.
    async fn resolve<F, Fut>(
        &self,
        key: &str,
        factory: F,
        bypass_expiration: bool,
        cancel: &CancellationToken,
        expires_at: Option<ExpiresAt<T>>,
    ) -> Result<Attempt<T, E>, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if cancel.is_cancelled() {
            return Err(CacheError::Aborted);
        }

        if let Some(current) = self.storage.get_entry(key).await? {
            if !bypass_expiration && !current.is_expired(now_millis()) {
                trace!(key, "cache hit");
                #[cfg(feature = "stats")]
                self.stats.record_hit();
                return Ok(Attempt::Done(current));
            }
        }

        debug!(key, bypass_expiration, "running factory");
        #[cfg(feature = "stats")]
        self.stats.record_miss();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CacheError::Aborted),
            outcome = factory(cancel.child_token()) => outcome,
        };
        if cancel.is_cancelled() {
            return Err(CacheError::Aborted);
        }

        let now = now_millis();
        let entry = match outcome {
            Ok(result) => {
                let expires_at = match expires_at {
                    Some(expires_at) => expires_at.resolve(&result),
                    None => millis_after(now, self.max_cache_time),
                };
                Entry::with_result(result, now, expires_at)
            }
            Err(error) => Entry::with_error(error, now, millis_after(now, self.max_error_time)),
        };

        if entry.is_expired(now_millis()) {
            trace!(key, "entry expired before it was written");
            return Ok(Attempt::Done(entry));
        }

        match self.storage.set_entry(key, entry.clone()).await {
            Ok(()) => Ok(Attempt::Done(entry)),
            Err(StorageError::NotEnoughSpace) => Ok(Attempt::NoSpace(entry)),
            Err(err) => Err(err.into()),
        }
    }

    /// Sweeps expired entries under the global exclusive lock, then writes `entry`
    /// unless a newer entry for `key` showed up in the meantime.
    async fn evict_and_commit(
        &self,
        key: &str,
        entry: Entry<T, E>,
        global: &Arc<dyn CacheMutex>,
    ) -> Result<Entry<T, E>, CacheError<E>> {
        warn!(key, "storage is full, sweeping expired entries");
        let _exclusive = global.lock_exclusive().await?;

        let latest = self.storage.get_entry(key).await?;
        self.sweep_locked().await?;

        if let Some(latest) = latest {
            if latest.created_at > entry.created_at {
                debug!(key, "keeping newer entry written during the sweep");
                return Ok(latest);
            }
        }

        if !entry.is_expired(now_millis()) {
            self.storage.set_entry(key, entry.clone()).await?;
        }
        Ok(entry)
    }

    /// Deletes every expired or unreadable entry. The caller holds the global
    /// mutex exclusively.
    async fn sweep_locked(&self) -> Result<usize, StorageError> {
        let now = now_millis();
        let mut evicted = 0;

        for key in self.storage.get_keys().await? {
            let expired = match self.storage.get_expiry(&key).await? {
                Some(expires_at) => now >= expires_at,
                None => true,
            };
            if expired {
                self.storage.delete_entry(&key).await?;
                evicted += 1;
            }
        }

        #[cfg(feature = "stats")]
        self.stats.record_evictions(evicted as u64);
        info!(evicted, "eviction sweep finished");
        Ok(evicted)
    }

    /// Waits for a lock unless the call is cancelled first.
    async fn acquire(
        lock: impl Future<Output = Result<MutexGuard, LockError>> + Send,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard, CacheError<E>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CacheError::Aborted),
            guard = lock => Ok(guard?),
        }
    }

    fn key_mutex<'a>(&'a self, key: &'a str) -> KeyMutex<'a> {
        let mutex = match self.mutexes.get(key) {
            Some(mutex) => mutex.value().clone(),
            None => self
                .mutexes
                .entry(key.to_string())
                .or_insert_with(|| self.mutex_factory.create(Some(key)))
                .value()
                .clone(),
        };
        KeyMutex {
            mutexes: &self.mutexes,
            key,
            mutex,
        }
    }

    fn global_mutex(&self) -> Arc<dyn CacheMutex> {
        self.global
            .get_or_init(|| self.mutex_factory.create(None))
            .clone()
    }
}

/// A per-key mutex on loan from the cache. Dropping the last loan removes the
/// mutex from the map.
struct KeyMutex<'a> {
    mutexes: &'a DashMap<String, Arc<dyn CacheMutex>>,
    key: &'a str,
    mutex: Arc<dyn CacheMutex>,
}

impl Deref for KeyMutex<'_> {
    type Target = dyn CacheMutex;

    fn deref(&self) -> &Self::Target {
        &*self.mutex
    }
}

impl Drop for KeyMutex<'_> {
    fn drop(&mut self) {
        // The map holds one reference and this loan another.
        self.mutexes.remove_if(self.key, |_, mutex| {
            Arc::ptr_eq(mutex, &self.mutex) && Arc::strong_count(mutex) == 2
        });
    }
}

impl<T, E> Default for Cache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl<T, E> fmt::Debug for Cache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("max_cache_time", &self.max_cache_time)
            .field("max_error_time", &self.max_error_time)
            .field("mutexes", &self.mutexes.len())
            .finish_non_exhaustive()
    }
}

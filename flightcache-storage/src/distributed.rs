use crate::lock::{LockManager, LockMode};
use crate::storage_id::StorageId;
use async_trait::async_trait;
use flightcache_core::{CacheMutex, LockError, MutexFactory, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// A [`CacheMutex`] backed by named locks of a [`LockManager`].
///
/// Lock names carry the storage id, so caches over the same physical store
/// share locks and caches over different stores never contend:
///
/// - keyed mutex: `"<key>__<storage id>"`
/// - global mutex: `"<storage id>"`
pub struct DistributedMutex {
    key: Option<String>,
    storage_id: Arc<StorageId>,
    locks: Arc<dyn LockManager>,
}

impl DistributedMutex {
    pub fn new(key: Option<&str>, storage_id: Arc<StorageId>, locks: Arc<dyn LockManager>) -> Self {
        Self {
            key: key.map(str::to_string),
            storage_id,
            locks,
        }
    }

    /// The lock name, negotiating the storage id if needed.
    pub async fn lock_name(&self) -> Result<String, LockError> {
        let id = self.storage_id.get().await?;
        Ok(match &self.key {
            Some(key) => format!("{key}__{id}"),
            None => id.to_string(),
        })
    }

    async fn acquire(&self, mode: LockMode) -> Result<MutexGuard, LockError> {
        let name = self.lock_name().await?;
        self.locks.acquire(&name, mode).await
    }
}

impl fmt::Debug for DistributedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedMutex")
            .field("key", &self.key)
            .field("storage_id", &self.storage_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheMutex for DistributedMutex {
    async fn lock_exclusive(&self) -> Result<MutexGuard, LockError> {
        self.acquire(LockMode::Exclusive).await
    }

    async fn lock_shared(&self) -> Result<MutexGuard, LockError> {
        self.acquire(LockMode::Shared).await
    }
}

/// Builds [`DistributedMutex`]es sharing one storage id.
#[derive(Clone)]
pub struct DistributedMutexFactory {
    storage_id: Arc<StorageId>,
    locks: Arc<dyn LockManager>,
}

impl DistributedMutexFactory {
    pub fn new(storage_id: Arc<StorageId>, locks: Arc<dyn LockManager>) -> Self {
        Self { storage_id, locks }
    }
}

impl fmt::Debug for DistributedMutexFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedMutexFactory")
            .field("storage_id", &self.storage_id)
            .finish_non_exhaustive()
    }
}

impl MutexFactory for DistributedMutexFactory {
    fn create(&self, key: Option<&str>) -> Arc<dyn CacheMutex> {
        Arc::new(DistributedMutex::new(
            key,
            self.storage_id.clone(),
            self.locks.clone(),
        ))
    }
}

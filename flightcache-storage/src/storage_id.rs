use crate::lock::{LockManager, LockMode};
use crate::store::KeyValueStore;
use flightcache_core::{LockError, StorageError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

/// Key under which a store keeps its instance id.
pub const STORAGE_ID_KEY: &str = "flightcache:storage-id";

/// Name of the lock guarding the instance id.
pub const STORAGE_ID_LOCK: &str = "flightcache:storage-id";

/// The id of a physical store, shared by every cache that writes to it.
///
/// The first cache to need it reads it under a shared lock; if the store has
/// none yet, it takes the exclusive lock, checks again, and writes a fresh
/// UUID. The result is remembered for the life of this value.
pub struct StorageId {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<dyn LockManager>,
    id: OnceCell<String>,
}

impl StorageId {
    pub fn new(store: Arc<dyn KeyValueStore>, locks: Arc<dyn LockManager>) -> Self {
        Self {
            store,
            locks,
            id: OnceCell::new(),
        }
    }

    /// Returns the id, negotiating it on first call.
    pub async fn get(&self) -> Result<&str, LockError> {
        self.id
            .get_or_try_init(|| self.negotiate())
            .await
            .map(String::as_str)
    }

    async fn negotiate(&self) -> Result<String, LockError> {
        {
            let _shared = self.locks.acquire(STORAGE_ID_LOCK, LockMode::Shared).await?;
            if let Some(id) = self.read().await? {
                return Ok(id);
            }
        }

        let _exclusive = self
            .locks
            .acquire(STORAGE_ID_LOCK, LockMode::Exclusive)
            .await?;
        if let Some(id) = self.read().await? {
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        self.store
            .set_item(STORAGE_ID_KEY, &id)
            .await
            .map_err(|err| LockError::StorageId(StorageError::from(err)))?;
        debug!(storage_id = %id, "created storage id");
        Ok(id)
    }

    /// Reads the stored id; anything that is not a UUID counts as missing.
    async fn read(&self) -> Result<Option<String>, LockError> {
        let value = self
            .store
            .get_item(STORAGE_ID_KEY)
            .await
            .map_err(|err| LockError::StorageId(StorageError::from(err)))?;
        Ok(value.filter(|id| Uuid::parse_str(id).is_ok()))
    }
}

impl fmt::Debug for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageId").field("id", &self.id.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LocalLockManager;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_id_is_created_once_and_shared() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LocalLockManager::new());

        let first = StorageId::new(store.clone(), locks.clone());
        let second = StorageId::new(store.clone(), locks.clone());

        let (a, b) = tokio::join!(first.get(), second.get());
        let (a, b) = (a.unwrap().to_string(), b.unwrap().to_string());
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(store.get_item(STORAGE_ID_KEY).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn test_existing_id_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let existing = Uuid::new_v4().to_string();
        store.set_item(STORAGE_ID_KEY, &existing).await.unwrap();

        let id = StorageId::new(store, Arc::new(LocalLockManager::new()));
        assert_eq!(id.get().await.unwrap(), existing);
    }

    #[tokio::test]
    async fn test_garbage_id_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set_item(STORAGE_ID_KEY, "garbage").await.unwrap();

        let id = StorageId::new(store.clone(), Arc::new(LocalLockManager::new()));
        let negotiated = id.get().await.unwrap().to_string();
        assert_ne!(negotiated, "garbage");
        assert_eq!(store.get_item(STORAGE_ID_KEY).await.unwrap(), Some(negotiated));
    }

    #[tokio::test]
    async fn test_full_store_fails_negotiation() {
        let store = Arc::new(MemoryStore::with_quota(4));
        let id = StorageId::new(store, Arc::new(LocalLockManager::new()));
        assert!(matches!(id.get().await, Err(LockError::StorageId(_))));
    }
}

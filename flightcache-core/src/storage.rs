//! # Storage backends
//!
//! A [`Storage`] keeps one [`Entry`] per key. The cache only touches a backend
//! while holding the relevant mutex, so implementations need to be `Send + Sync`
//! but do not have to coordinate concurrent writers to the same key.
//!
//! [`MemoryStorage`] is the default backend. Persistent backends live in the
//! `flightcache-storage` crate.

use crate::error::StorageError;
use crate::Entry;
use async_trait::async_trait;
use dashmap::DashMap;

/// Key/value backend holding cache entries.
///
/// # Contract
///
/// * `get_entry` returns `Ok(None)` for absent keys and also for records that
///   cannot be decoded; a broken record heals on the next write.
/// * `set_entry` returns [`StorageError::NotEnoughSpace`] when the backend
///   refuses a write because of size limits. The cache reacts by sweeping
///   expired entries and retrying. Any other error reaches the caller.
/// * `get_keys` lists every key the backend currently holds.
/// * `get_expiry` reports when the record under a key expires, without
///   requiring its payload to decode. The eviction sweep relies on it, so a
///   backend shared by caches of different types must override it.
#[async_trait]
pub trait Storage<T, E>: Send + Sync {
    async fn get_entry(&self, key: &str) -> Result<Option<Entry<T, E>>, StorageError>;

    /// Expiration time of the record under `key`, `None` if there is no
    /// readable record at all.
    async fn get_expiry(&self, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.get_entry(key).await?.map(|entry| entry.expires_at))
    }

    async fn set_entry(&self, key: &str, entry: Entry<T, E>) -> Result<(), StorageError>;

    async fn get_keys(&self) -> Result<Vec<String>, StorageError>;

    async fn delete_entry(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage backed by a `DashMap`.
///
/// Never reports capacity errors.
///
/// # Examples
///
/// ```
/// # tokio_test_block_on(async {
/// use flightcache_core::{Entry, MemoryStorage, Storage};
///
/// let storage: MemoryStorage<u32, String> = MemoryStorage::new();
/// storage.set_entry("answer", Entry::with_result(42, 0, u64::MAX)).await.unwrap();
///
/// let entry = storage.get_entry("answer").await.unwrap().unwrap();
/// assert_eq!(entry.result(), Some(&42));
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct MemoryStorage<T, E> {
    entries: DashMap<String, Entry<T, E>>,
}

impl<T, E> MemoryStorage<T, E> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T, E> Default for MemoryStorage<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T, E> Storage<T, E> for MemoryStorage<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn get_entry(&self, key: &str) -> Result<Option<Entry<T, E>>, StorageError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set_entry(&self, key: &str, entry: Entry<T, E>) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn delete_entry(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage: MemoryStorage<String, String> = MemoryStorage::new();
        assert!(storage.get_entry("k").await.unwrap().is_none());

        storage
            .set_entry("k", Entry::with_result("v".to_string(), 1, 2))
            .await
            .unwrap();
        let entry = storage.get_entry("k").await.unwrap().unwrap();
        assert_eq!(entry.result().map(String::as_str), Some("v"));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_storage_replaces_entry() {
        let storage: MemoryStorage<u32, String> = MemoryStorage::new();
        storage.set_entry("k", Entry::with_result(1, 1, 10)).await.unwrap();
        storage
            .set_entry("k", Entry::with_error("bad".to_string(), 2, 3))
            .await
            .unwrap();

        let entry = storage.get_entry("k").await.unwrap().unwrap();
        assert_eq!(entry.error().map(String::as_str), Some("bad"));
        assert_eq!(entry.created_at, 2);
    }

    #[tokio::test]
    async fn test_memory_storage_keys_and_delete() {
        let storage: MemoryStorage<u32, ()> = MemoryStorage::new();
        for key in ["a", "b", "c"] {
            storage.set_entry(key, Entry::with_result(0, 0, 1)).await.unwrap();
        }

        let mut keys = storage.get_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);

        storage.delete_entry("b").await.unwrap();
        assert!(storage.get_entry("b").await.unwrap().is_none());
        assert_eq!(storage.len(), 2);
    }
}

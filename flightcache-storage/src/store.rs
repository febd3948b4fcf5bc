//! # Key/value stores
//!
//! A [`KeyValueStore`] is the physical string-to-string store a
//! [`PersistentStorage`](crate::PersistentStorage) writes cache records into.
//! It mirrors the classic web-storage surface: get, set, remove, and
//! enumeration by index.
//!
//! Stores may enforce a byte quota and answer a write that would exceed it with
//! [`StoreError::QuotaExceeded`].

use async_trait::async_trait;
use flightcache_core::StorageError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Default quota of the process-wide session store: 5 MiB.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Errors reported by a [`KeyValueStore`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded { .. } => StorageError::NotEnoughSpace,
            StoreError::Io(err) => StorageError::Io(err),
        }
    }
}

/// A string key/value store that can be shared by several caches.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// Returns the key at `index` in the store's enumeration order.
    async fn key(&self, index: usize) -> Result<Option<String>, StoreError>;

    /// Returns the number of stored keys.
    async fn length(&self) -> Result<usize, StoreError>;

    /// Returns every stored key.
    ///
    /// The default walks [`key`](Self::key) from `0` to [`length`](Self::length).
    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let length = self.length().await?;
        let mut keys = Vec::with_capacity(length);
        for index in 0..length {
            if let Some(key) = self.key(index).await? {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

/// In-memory store with an optional byte quota.
///
/// Usage is the sum of the UTF-8 lengths of all keys and values.
///
/// # Examples
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// use flightcache_storage::{KeyValueStore, MemoryStore, StoreError};
///
/// let store = MemoryStore::with_quota(8);
/// store.set_item("a", "1234").await.unwrap();
///
/// let err = store.set_item("b", "123456").await.unwrap_err();
/// assert!(matches!(err, StoreError::QuotaExceeded { .. }));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<String, String>>,
    quota: Option<usize>,
}

static SESSION_STORE: Lazy<Arc<MemoryStore>> =
    Lazy::new(|| Arc::new(MemoryStore::with_quota(DEFAULT_QUOTA_BYTES)));

impl MemoryStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            quota: Some(quota),
        }
    }

    /// The process-wide store backing the session scope.
    ///
    /// Created on first use and shared by every caller for the life of the
    /// process. Use [`clear`](Self::clear) to reset it.
    pub fn session() -> Arc<MemoryStore> {
        SESSION_STORE.clone()
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.items
            .read()
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }

    pub fn clear(&self) {
        self.items.write().clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items.write();
        if let Some(quota) = self.quota {
            let used: usize = items
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, value)| existing.len() + value.len())
                .sum();
            let needed = used + key.len() + value.len();
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items.write().remove(key);
        Ok(())
    }

    async fn key(&self, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self.items.read().keys().nth(index).cloned())
    }

    async fn length(&self) -> Result<usize, StoreError> {
        Ok(self.items.read().len())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.items.read().keys().cloned().collect())
    }
}

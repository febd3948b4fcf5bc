//! # Persistent storage adapter
//!
//! [`PersistentStorage`] implements the cache's [`Storage`] trait on top of a
//! [`KeyValueStore`], one JSON record per cache key:
//!
//! ```text
//! {"createdAt": 1700000000000, "expiresAt": 1700000900000, "result": <value>}
//! {"createdAt": 1700000000000, "expiresAt": 1700000001000, "error": "message"}
//! ```
//!
//! Errors keep only their message. Records that do not have this shape read as
//! absent, so a corrupted record is replaced by the next write instead of
//! failing every read.

use crate::store::KeyValueStore;
use async_trait::async_trait;
use flightcache_core::{Entry, ErrorMessage, Storage, StorageError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// Prefix of every cache record in the underlying store.
pub const ENTRY_PREFIX: &str = "flightcache:entry:";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordRef<'a, T> {
    created_at: u64,
    expires_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timestamps {
    #[allow(dead_code)]
    created_at: u64,
    expires_at: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    created_at: u64,
    expires_at: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Serializes an entry into its persisted record.
pub fn encode_entry<T, E>(entry: &Entry<T, E>) -> Result<String, serde_json::Error>
where
    T: Serialize,
    E: Display,
{
    let (result, error) = match &entry.outcome {
        Ok(result) => (Some(result), None),
        Err(error) => (None, Some(error.to_string())),
    };
    serde_json::to_string(&RecordRef {
        created_at: entry.created_at,
        expires_at: entry.expires_at,
        result,
        error,
    })
}

/// Parses a persisted record, returning `None` if it is malformed.
///
/// A missing `result` reads as JSON `null`, which suits `()` and `Option` results.
pub fn decode_entry<T, E>(text: &str) -> Option<Entry<T, E>>
where
    T: DeserializeOwned,
    E: From<ErrorMessage>,
{
    let raw: RawRecord = serde_json::from_str(text).ok()?;
    let outcome = match raw.error {
        Some(message) => Err(E::from(ErrorMessage(message))),
        None => Ok(serde_json::from_value(raw.result.unwrap_or_default()).ok()?),
    };
    Some(Entry::new(outcome, raw.created_at, raw.expires_at))
}

/// Reads only the expiration time of a persisted record.
///
/// The payload is not decoded, so a record written by a cache with another
/// result type still reports its expiry. Returns `None` for text that is not a
/// record at all.
pub fn decode_expiry(text: &str) -> Option<u64> {
    serde_json::from_str::<Timestamps>(text)
        .ok()
        .map(|record| record.expires_at)
}

/// Cache storage over a shared [`KeyValueStore`].
///
/// Cache keys are stored under [`ENTRY_PREFIX`]; other keys in the store are
/// neither listed nor swept. Caches with different result types may share a
/// store: a sweep judges records by their timestamps only.
pub struct PersistentStorage<T, E> {
    store: Arc<dyn KeyValueStore>,
    _types: PhantomData<fn() -> (T, E)>,
}

impl<T, E> PersistentStorage<T, E> {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            _types: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// The key a cache key is stored under.
    pub fn record_key(key: &str) -> String {
        format!("{ENTRY_PREFIX}{key}")
    }
}

impl<T, E> fmt::Debug for PersistentStorage<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentStorage").finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, E> Storage<T, E> for PersistentStorage<T, E>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Display + From<ErrorMessage> + Send + Sync + 'static,
{
    async fn get_entry(&self, key: &str) -> Result<Option<Entry<T, E>>, StorageError> {
        let Some(text) = self.store.get_item(&Self::record_key(key)).await? else {
            return Ok(None);
        };
        let entry = decode_entry(&text);
        if entry.is_none() {
            trace!(key, "ignoring malformed record");
        }
        Ok(entry)
    }

    async fn get_expiry(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let text = self.store.get_item(&Self::record_key(key)).await?;
        Ok(text.as_deref().and_then(decode_expiry))
    }

    async fn set_entry(&self, key: &str, entry: Entry<T, E>) -> Result<(), StorageError> {
        let text = encode_entry(&entry).map_err(StorageError::backend)?;
        self.store.set_item(&Self::record_key(key), &text).await?;
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .store
            .keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(ENTRY_PREFIX).map(str::to_string))
            .collect())
    }

    async fn delete_entry(&self, key: &str) -> Result<(), StorageError> {
        self.store.remove_item(&Self::record_key(key)).await?;
        Ok(())
    }
}

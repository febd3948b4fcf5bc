//! Error types shared by every cache backend.

use std::error::Error as StdError;
use thiserror::Error;

/// Errors reported by a [`Storage`](crate::Storage) backend.
///
/// [`StorageError::NotEnoughSpace`] is the capacity signal: a backend returns it
/// when it refuses a write because of size limits, and the cache answers with an
/// eviction sweep followed by a retry instead of surfacing it to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not enough space in storage")]
    NotEnoughSpace,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend failed: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StorageError {
    /// Wraps an arbitrary backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        StorageError::Backend(err.into())
    }

    /// Returns true for the capacity signal.
    pub fn is_not_enough_space(&self) -> bool {
        matches!(self, StorageError::NotEnoughSpace)
    }
}

/// Errors raised while acquiring a [`CacheMutex`](crate::CacheMutex).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LockError {
    #[error("lock `{0}` is no longer available")]
    Closed(String),

    #[error("failed to negotiate storage id: {0}")]
    StorageId(#[source] StorageError),
}

/// Errors returned by [`Cache`](crate::Cache) operations.
///
/// `E` is the error type produced by factories. A factory error is cached for
/// `max_error_time` and handed back as [`CacheError::Factory`] to every caller
/// that observes the cached entry.
#[derive(Debug, Error)]
pub enum CacheError<E> {
    #[error("cache operation was aborted")]
    Aborted,

    #[error("factory failed: {0}")]
    Factory(E),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl<E> CacheError<E> {
    /// Returns the factory error, if this is one.
    pub fn into_factory(self) -> Option<E> {
        match self {
            CacheError::Factory(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, CacheError::Aborted)
    }
}

/// A message-only error restored from a persisted entry.
///
/// Persistent backends keep only the `Display` text of a cached error. On read
/// it comes back as an `ErrorMessage` and is converted into the cache's error
/// type through `From<ErrorMessage>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ErrorMessage(pub String);

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for ErrorMessage {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ErrorMessage {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_enough_space_is_recognised() {
        assert!(StorageError::NotEnoughSpace.is_not_enough_space());
        let io = StorageError::from(std::io::Error::other("disk"));
        assert!(!io.is_not_enough_space());
    }

    #[test]
    fn test_cache_error_into_factory() {
        let err: CacheError<&str> = CacheError::Factory("boom");
        assert_eq!(err.into_factory(), Some("boom"));

        let err: CacheError<&str> = CacheError::Aborted;
        assert!(err.is_aborted());
        assert_eq!(err.into_factory(), None);
    }

    #[test]
    fn test_error_message_display() {
        let err = ErrorMessage::from("upstream timed out");
        assert_eq!(err.to_string(), "upstream timed out");
        assert_eq!(err.message(), "upstream timed out");
    }
}

//! Cache configuration.

use crate::mutex::{LocalMutexFactory, MutexFactory};
use crate::storage::{MemoryStorage, Storage};
use crate::utils::{millis_after, now_millis};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default validity window for successful results: 15 minutes.
pub const DEFAULT_MAX_CACHE_TIME: Duration = Duration::from_millis(900_000);

/// Default validity window for cached errors: 1 second.
pub const DEFAULT_MAX_ERROR_TIME: Duration = Duration::from_millis(1_000);

/// Options for building a [`Cache`](crate::Cache).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use flightcache_core::CacheOptions;
///
/// let options: CacheOptions<String, String> = CacheOptions::default()
///     .with_max_cache_time(Duration::from_secs(60))
///     .with_max_error_time(Duration::from_millis(250));
///
/// assert_eq!(options.max_cache_time, Duration::from_secs(60));
/// ```
pub struct CacheOptions<T, E> {
    /// How long a successful result stays valid unless the call sets `expires_at`.
    pub max_cache_time: Duration,
    /// How long a factory error stays cached.
    pub max_error_time: Duration,
    pub mutex_factory: Arc<dyn MutexFactory>,
    pub storage: Arc<dyn Storage<T, E>>,
}

impl<T, E> CacheOptions<T, E> {
    pub fn with_max_cache_time(mut self, max_cache_time: Duration) -> Self {
        self.max_cache_time = max_cache_time;
        self
    }

    pub fn with_max_error_time(mut self, max_error_time: Duration) -> Self {
        self.max_error_time = max_error_time;
        self
    }

    pub fn with_mutex_factory(mut self, mutex_factory: Arc<dyn MutexFactory>) -> Self {
        self.mutex_factory = mutex_factory;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage<T, E>>) -> Self {
        self.storage = storage;
        self
    }

    /// Applies the durations of a loaded [`CacheConfig`].
    pub fn with_config(self, config: &CacheConfig) -> Self {
        self.with_max_cache_time(config.max_cache_time)
            .with_max_error_time(config.max_error_time)
    }
}

impl<T, E> Default for CacheOptions<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            max_cache_time: DEFAULT_MAX_CACHE_TIME,
            max_error_time: DEFAULT_MAX_ERROR_TIME,
            mutex_factory: Arc::new(LocalMutexFactory),
            storage: Arc::new(MemoryStorage::new()),
        }
    }
}

impl<T, E> fmt::Debug for CacheOptions<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("max_cache_time", &self.max_cache_time)
            .field("max_error_time", &self.max_error_time)
            .field("mutex_factory", &"<MutexFactory>")
            .field("storage", &"<Storage>")
            .finish()
    }
}

/// Serializable subset of the cache options.
///
/// Durations use humantime notation:
///
/// ```
/// use std::time::Duration;
/// use flightcache_core::CacheConfig;
///
/// let config: CacheConfig =
///     serde_json::from_str(r#"{ "max_cache_time": "5m", "max_error_time": "2s" }"#).unwrap();
/// assert_eq!(config.max_cache_time, Duration::from_secs(300));
/// assert_eq!(config.max_error_time, Duration::from_secs(2));
///
/// let defaults: CacheConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(defaults, CacheConfig::default());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(with = "humantime_serde")]
    pub max_cache_time: Duration,
    #[serde(with = "humantime_serde")]
    pub max_error_time: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_time: DEFAULT_MAX_CACHE_TIME,
            max_error_time: DEFAULT_MAX_ERROR_TIME,
        }
    }
}

/// Explicit expiration for a successful result.
pub enum ExpiresAt<T> {
    /// Absolute time in milliseconds since the Unix epoch.
    At(u64),
    /// Computed from the result once the factory succeeds.
    Compute(Box<dyn FnOnce(&T) -> u64 + Send>),
}

impl<T> ExpiresAt<T> {
    /// Expires `duration` from now.
    pub fn after(duration: Duration) -> Self {
        ExpiresAt::At(millis_after(now_millis(), duration))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> u64 + Send + 'static,
    {
        ExpiresAt::Compute(Box::new(f))
    }

    pub(crate) fn resolve(self, result: &T) -> u64 {
        match self {
            ExpiresAt::At(at) => at,
            ExpiresAt::Compute(f) => f(result),
        }
    }
}

impl<T> fmt::Debug for ExpiresAt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiresAt::At(at) => f.debug_tuple("At").field(at).finish(),
            ExpiresAt::Compute(_) => f.write_str("Compute(<fn>)"),
        }
    }
}

/// Per-call options for [`Cache::get_or_create_with`](crate::Cache::get_or_create_with)
/// and [`Cache::set_with`](crate::Cache::set_with).
#[derive(Debug)]
pub struct CallOptions<T> {
    pub cancel: Option<CancellationToken>,
    pub expires_at: Option<ExpiresAt<T>>,
}

impl<T> CallOptions<T> {
    pub fn new() -> Self {
        Self {
            cancel: None,
            expires_at: None,
        }
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn expires_at(mut self, expires_at: ExpiresAt<T>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl<T> Default for CallOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at_literal() {
        assert_eq!(ExpiresAt::<u32>::At(1234).resolve(&0), 1234);
    }

    #[test]
    fn test_expires_at_from_result() {
        let expires = ExpiresAt::from_fn(|ttl: &u64| 1_000 + ttl);
        assert_eq!(expires.resolve(&500), 1_500);
    }

    #[test]
    fn test_expires_after_is_in_the_future() {
        let now = now_millis();
        match ExpiresAt::<()>::after(Duration::from_secs(10)) {
            ExpiresAt::At(at) => assert!(at >= now + 10_000),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_default_options() {
        let options: CacheOptions<u8, u8> = CacheOptions::default();
        assert_eq!(options.max_cache_time, Duration::from_secs(900));
        assert_eq!(options.max_error_time, Duration::from_secs(1));
    }

    #[test]
    fn test_options_from_config() {
        let config = CacheConfig {
            max_cache_time: Duration::from_secs(3),
            max_error_time: Duration::from_millis(10),
        };
        let options: CacheOptions<u8, u8> = CacheOptions::default().with_config(&config);
        assert_eq!(options.max_cache_time, Duration::from_secs(3));
        assert_eq!(options.max_error_time, Duration::from_millis(10));
    }
}

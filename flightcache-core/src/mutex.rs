//! # Cache mutexes
//!
//! Every cache operation holds two locks: the global mutex in shared mode and,
//! inside it, the mutex of its key in exclusive mode. An eviction sweep takes
//! the global mutex in exclusive mode, which waits for in-flight operations and
//! blocks new ones until the sweep is done.
//!
//! [`LocalMutex`] coordinates the tasks of a single cache instance. Mutexes
//! that coordinate several caches over shared storage are provided by
//! `flightcache-storage`.

use crate::error::LockError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds a lock until dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard {
    _held: Box<dyn Send + Sync>,
}

impl MutexGuard {
    /// Wraps any value whose drop releases a lock.
    pub fn new<G>(guard: G) -> Self
    where
        G: Send + Sync + 'static,
    {
        Self {
            _held: Box::new(guard),
        }
    }
}

impl fmt::Debug for MutexGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard").finish_non_exhaustive()
    }
}

/// A lock with exclusive and shared modes.
///
/// Exclusive holders exclude everyone; shared holders only exclude exclusive
/// ones. Acquisition order is up to the implementation.
#[async_trait]
pub trait CacheMutex: Send + Sync {
    async fn lock_exclusive(&self) -> Result<MutexGuard, LockError>;

    async fn lock_shared(&self) -> Result<MutexGuard, LockError>;
}

impl dyn CacheMutex {
    /// Runs `f` while holding this mutex exclusively.
    pub async fn run_exclusive<F, Fut, R>(&self, f: F) -> Result<R, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let _guard = self.lock_exclusive().await?;
        Ok(f().await)
    }

    /// Runs `f` while holding this mutex in shared mode.
    pub async fn run_shared<F, Fut, R>(&self, f: F) -> Result<R, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let _guard = self.lock_shared().await?;
        Ok(f().await)
    }
}

/// Builds the mutexes used by a cache.
///
/// `key` is `None` for the global mutex and `Some(key)` for a per-key mutex.
/// A cache calls the factory once for the global mutex. Per-key mutexes are
/// created when a key is first locked and again after an idle one was dropped,
/// so two mutexes built for the same key must lock the same thing or be
/// unable to overlap.
pub trait MutexFactory: Send + Sync {
    fn create(&self, key: Option<&str>) -> Arc<dyn CacheMutex>;
}

impl<F> MutexFactory for F
where
    F: Fn(Option<&str>) -> Arc<dyn CacheMutex> + Send + Sync,
{
    fn create(&self, key: Option<&str>) -> Arc<dyn CacheMutex> {
        self(key)
    }
}

/// In-process mutex backed by a `tokio::sync::RwLock`.
///
/// Both modes are real for keyed and global instances. Waiters are served in
/// FIFO order.
#[derive(Debug, Default, Clone)]
pub struct LocalMutex {
    lock: Arc<RwLock<()>>,
}

impl LocalMutex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheMutex for LocalMutex {
    async fn lock_exclusive(&self) -> Result<MutexGuard, LockError> {
        Ok(MutexGuard::new(self.lock.clone().write_owned().await))
    }

    async fn lock_shared(&self) -> Result<MutexGuard, LockError> {
        Ok(MutexGuard::new(self.lock.clone().read_owned().await))
    }
}

/// Default [`MutexFactory`]: a fresh [`LocalMutex`] per key.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMutexFactory;

impl MutexFactory for LocalMutexFactory {
    fn create(&self, _key: Option<&str>) -> Arc<dyn CacheMutex> {
        Arc::new(LocalMutex::new())
    }
}

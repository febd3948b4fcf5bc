//! # Named locks
//!
//! A [`LockManager`] hands out shared or exclusive locks by name. Every cache
//! that uses the same manager and the same name contends for the same lock,
//! which is how caches over one physical store coordinate with each other.
//!
//! [`LocalLockManager::global`] is the process-wide manager:
//!
//! - **init**: created lazily on first use;
//! - **lookup**: a lock is created the first time its name is requested;
//! - **teardown**: a lock is forgotten when its last guard is released and
//!   nobody waits for it. [`LocalLockManager::prune`] sweeps up the rest.
//!
//! It only coordinates within one process. Caches in separate processes that
//! share a [`FileStore`](crate::FileStore) directory need a manager backed by
//! an inter-process lock service.

use async_trait::async_trait;
use dashmap::DashMap;
use flightcache_core::{LockError, MutexGuard};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Grants named locks across every cache that shares the manager.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Waits until the lock `name` can be held in `mode`.
    async fn acquire(&self, name: &str, mode: LockMode) -> Result<MutexGuard, LockError>;
}

static GLOBAL_LOCKS: Lazy<Arc<LocalLockManager>> = Lazy::new(|| Arc::new(LocalLockManager::new()));

type LockTable = DashMap<String, Arc<RwLock<()>>>;

/// In-process [`LockManager`] keeping one `tokio::sync::RwLock` per name.
///
/// Names only stay in the table while a lock is held or awaited, so the table
/// does not grow with the number of keys ever locked.
#[derive(Debug, Default)]
pub struct LocalLockManager {
    locks: Arc<LockTable>,
}

impl LocalLockManager {
    /// Creates a manager isolated from the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide manager.
    pub fn global() -> Arc<LocalLockManager> {
        GLOBAL_LOCKS.clone()
    }

    /// Number of names currently known.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Forgets every lock that is neither held nor awaited; returns how many.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        // Holders and waiters keep a clone of the Arc.
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        if let Some(lock) = self.locks.get(name) {
            return lock.value().clone();
        }
        self.locks
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }
}

enum Held {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// Releases a named lock and drops the name once it is idle.
struct NamedGuard {
    held: Option<Held>,
    lock: Arc<RwLock<()>>,
    name: String,
    locks: Arc<LockTable>,
}

impl Drop for NamedGuard {
    fn drop(&mut self) {
        drop(self.held.take());
        // One reference in the table and ours; anyone else is a waiter or holder.
        let idle = self.locks.remove_if(&self.name, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
        if idle.is_some() {
            trace!(name = %self.name, "lock forgotten");
        }
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn acquire(&self, name: &str, mode: LockMode) -> Result<MutexGuard, LockError> {
        let lock = self.lock_for(name);
        trace!(name, ?mode, "acquiring lock");
        let held = match mode {
            LockMode::Shared => Held::Shared(lock.clone().read_owned().await),
            LockMode::Exclusive => Held::Exclusive(lock.clone().write_owned().await),
        };
        Ok(MutexGuard::new(NamedGuard {
            held: Some(held),
            lock,
            name: name.to_string(),
            locks: self.locks.clone(),
        }))
    }
}

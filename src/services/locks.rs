use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of per-stock-record async mutexes.
///
/// Holding the guard for a record serializes read-modify-write cycles on
/// that record within this process. Cross-process races are caught by the
/// store's version check instead.
#[derive(Debug, Clone, Default)]
pub struct StockLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Guard returned by [`StockLocks::acquire`]. Releasing it drops the lock
/// and prunes the registry entry when nobody else is waiting.
pub struct StockLockGuard {
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl StockLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: Uuid) -> StockLockGuard {
        let mutex = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        StockLockGuard {
            id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of records that currently have a registered lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for StockLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // only the registry still references this mutex
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

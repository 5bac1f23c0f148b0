//! Per-key exclusive sections.
//!
//! Work on distinct keys proceeds in parallel; work on the same key is
//! serialized. Locks are created on first use and can be pruned once no
//! task holds or waits on them.

use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Guard for a keyed exclusive section. Released on drop.
#[derive(Debug)]
pub struct KeyedGuard<K> {
    key: K,
    _guard: OwnedMutexGuard<()>,
}

impl<K> KeyedGuard<K> {
    /// The key this guard holds.
    pub fn key(&self) -> &K {
        &self.key
    }
}

/// Table of per-key async mutexes.
#[derive(Debug)]
pub struct KeyedLocks<K>
where
    K: Eq + Hash,
{
    locks: DashMap<K, Arc<Mutex<()>>>,
    acquisitions: AtomicU64,
    contended: AtomicU64,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the exclusive section for `key`, waiting if another task holds it.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        // The map reference must not be held across the await below.
        let lock = {
            let entry = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };

        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        let guard = match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.contended.fetch_add(1, Ordering::Relaxed);
                trace!(key = ?key, "Waiting for keyed lock");
                lock.lock_owned().await
            }
        };

        KeyedGuard { key, _guard: guard }
    }

    /// Returns true if some task currently holds the section for `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .get(key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Drops lock entries nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of lock entries currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Total number of `lock()` calls.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Number of `lock()` calls that had to wait.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }
}

//! Coalescing consumer queue.

use std::collections::BTreeMap;
use std::fmt::Debug;
use tokio::time::Instant;

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue name (e.g., "POLICY_CHANGE")
    pub name: String,
    /// Maximum number of keys returned by one `drain()`
    pub batch_size: usize,
}

impl ConsumerConfig {
    /// Creates a new consumer config.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batch_size: 1024,
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// A coalesced entry: every event seen for one key since the last drain.
#[derive(Debug, Clone)]
pub struct PendingEntry<V> {
    /// Most recent event value for the key
    pub latest: V,
    /// Number of events collapsed into this entry
    pub hits: u32,
    /// When the first event for the key arrived
    pub first_seen: Instant,
    /// When the most recent event for the key arrived
    pub last_seen: Instant,
}

/// Consumer of keyed change events.
///
/// Events are collapsed per key: however many events arrive for the same
/// key between two drains, the drain yields exactly one [`PendingEntry`]
/// carrying the latest value and a hit count. Keys drain in ascending
/// order so processing is deterministic.
pub struct Consumer<K, V> {
    config: ConsumerConfig,
    to_sync: BTreeMap<K, PendingEntry<V>>,
}

impl<K, V> Consumer<K, V>
where
    K: Ord + Clone + Debug,
    V: Debug,
{
    /// Creates a new consumer with the given configuration.
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: BTreeMap::new(),
        }
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns true if there are pending keys.
    pub fn has_pending(&self) -> bool {
        !self.to_sync.is_empty()
    }

    /// Returns the number of pending (distinct) keys.
    pub fn pending_count(&self) -> usize {
        self.to_sync.len()
    }

    /// Adds an event, merging it with any pending event for the same key.
    ///
    /// Returns true if the key was not already pending.
    pub fn add(&mut self, key: K, value: V) -> bool {
        let now = Instant::now();
        match self.to_sync.get_mut(&key) {
            Some(entry) => {
                entry.latest = value;
                entry.hits = entry.hits.saturating_add(1);
                entry.last_seen = now;
                false
            }
            None => {
                self.to_sync.insert(
                    key,
                    PendingEntry {
                        latest: value,
                        hits: 1,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Drains up to `batch_size` pending keys in ascending key order.
    pub fn drain(&mut self) -> Vec<(K, PendingEntry<V>)> {
        let keys: Vec<K> = self
            .to_sync
            .keys()
            .take(self.config.batch_size)
            .cloned()
            .collect();

        keys.into_iter()
            .filter_map(|k| self.to_sync.remove(&k).map(|e| (k, e)))
            .collect()
    }

    /// Drains the pending keys whose entry satisfies `ready`, in ascending
    /// key order and up to `batch_size`. Other keys stay queued.
    pub fn drain_where<F>(&mut self, mut ready: F) -> Vec<(K, PendingEntry<V>)>
    where
        F: FnMut(&PendingEntry<V>) -> bool,
    {
        let keys: Vec<K> = self
            .to_sync
            .iter()
            .filter(|(_, entry)| ready(entry))
            .take(self.config.batch_size)
            .map(|(k, _)| k.clone())
            .collect();

        keys.into_iter()
            .filter_map(|k| self.to_sync.remove(&k).map(|e| (k, e)))
            .collect()
    }

    /// Re-queues a drained entry that could not be processed.
    ///
    /// If the key received new events in the meantime, the newer value
    /// wins and the hit counts are summed.
    pub fn retry(&mut self, key: K, entry: PendingEntry<V>) {
        match self.to_sync.get_mut(&key) {
            Some(existing) => {
                existing.hits = existing.hits.saturating_add(entry.hits);
                existing.first_seen = existing.first_seen.min(entry.first_seen);
            }
            None => {
                self.to_sync.insert(key, entry);
            }
        }
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .map(|(key, e)| format!("{}: {:?} x{} {:?}", self.config.name, key, e.hits, e.latest))
            .collect()
    }
}

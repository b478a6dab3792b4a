//! LRU (Least Recently Used) replacement policy.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Tracks access recency of cached nodes, keyed by node offset.
///
/// Each access stamps the key with a monotonically increasing counter; the
/// victim is the evictable key with the oldest stamp. Pinned keys stay in the
/// order but are skipped during eviction.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Next stamp to hand out.
    clock: u64,

    /// Latest stamp per key.
    stamps: HashMap<u64, u64>,

    /// Keys ordered by stamp (oldest first).
    order: BTreeMap<u64, u64>,

    /// Keys that may currently be evicted.
    evictable: HashSet<u64>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a key was accessed, making it the most recent.
    pub fn record_access(&mut self, key: u64) {
        if let Some(old) = self.stamps.insert(key, self.clock) {
            self.order.remove(&old);
        }
        self.order.insert(self.clock, key);
        self.clock += 1;
    }

    /// Mark a key as evictable (pin count dropped to 0) or not.
    pub fn set_evictable(&mut self, key: u64, evictable: bool) {
        if evictable {
            self.evictable.insert(key);
        } else {
            self.evictable.remove(&key);
        }
    }

    /// Select and forget the least recently used evictable key.
    ///
    /// Returns None if every tracked key is pinned.
    pub fn evict(&mut self) -> Option<u64> {
        let (stamp, key) = self
            .order
            .iter()
            .find(|&(_, key)| self.evictable.contains(key))
            .map(|(&stamp, &key)| (stamp, key))?;

        self.order.remove(&stamp);
        self.stamps.remove(&key);
        self.evictable.remove(&key);
        Some(key)
    }

    /// Remove a key from the replacer entirely.
    pub fn remove(&mut self, key: u64) {
        if let Some(stamp) = self.stamps.remove(&key) {
            self.order.remove(&stamp);
        }
        self.evictable.remove(&key);
    }

    /// Number of evictable keys.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }

    /// Number of tracked keys, pinned or not.
    pub fn tracked(&self) -> usize {
        self.stamps.len()
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
        self.order.clear();
        self.evictable.clear();
    }
}

//! LRU Cache Module
//!
//! Cache engine combining HashMap lookup with arena-backed recency tracking.
//! Capacity is a hard bound; the least recently used entry is evicted first.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::cache::{forward_entry, is_same_instance, Cache, CacheEntry, CacheStats, LruList};
use crate::error::{CacheError, Result};

// == LRU State ==
/// Everything guarded by the instance lock.
///
/// `index` and `order` hold exactly the same keys at all times.
#[derive(Debug)]
struct LruState<K, V> {
    index: HashMap<K, usize>,
    order: LruList<K, V>,
    stats: CacheStats,
}

impl<K, V> LruState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            order: LruList::new(),
            stats: CacheStats::new(),
        }
    }

    fn get(&mut self, key: &K) -> Option<&CacheEntry<K, V>> {
        let Some(&slot) = self.index.get(key) else {
            self.stats.record_miss();
            return None;
        };

        if self.order.get(slot).map_or(true, |entry| entry.is_expired()) {
            self.remove(key);
            self.stats.record_miss();
            self.stats.record_expirations(1);
            return None;
        }

        self.stats.record_hit();
        self.order.touch(slot);
        self.order.get(slot)
    }

    /// Whether `key` is stored and live. Drops it if it is stored but expired.
    fn contains_live(&mut self, key: &K) -> bool {
        let Some(&slot) = self.index.get(key) else {
            return false;
        };
        if self.order.get(slot).map_or(true, |entry| entry.is_expired()) {
            self.remove(key);
            self.stats.record_expirations(1);
            return false;
        }
        true
    }

    fn upsert(&mut self, capacity: usize, key: K, value: V, timeout: Duration) {
        if capacity == 0 {
            return;
        }

        if let Some(&slot) = self.index.get(&key) {
            if let Some(entry) = self.order.get_mut(slot) {
                entry.refresh(value, timeout);
            }
            self.order.touch(slot);
            return;
        }

        if self.index.len() >= capacity {
            if let Some(evicted) = self.order.evict_oldest() {
                self.index.remove(&evicted.key);
                self.stats.record_eviction();
                debug!("LRU eviction: capacity {} reached", capacity);
            }
        }

        let slot = self
            .order
            .push_front(CacheEntry::new(key.clone(), value, timeout));
        self.index.insert(key, slot);
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<K, V>> {
        let slot = self.index.remove(key)?;
        self.order.remove(slot)
    }

    /// Slots of live entries, least recently used first.
    fn live_slots(&self, now: Instant) -> Vec<usize> {
        let mut slots: Vec<usize> = self
            .order
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(slot, _)| slot)
            .collect();
        slots.reverse();
        slots
    }
}

// == LRU Cache ==
/// Strictly bounded cache with least-recently-used eviction.
///
/// `get` and every write take the exclusive lock since they reorder recency.
/// A capacity of zero stores nothing.
pub struct LruCache<K, V> {
    capacity: usize,
    inner: RwLock<LruState<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(LruState::new()),
        }
    }

    // == Capacity ==
    /// Maximum number of entries held; the next new key evicts the oldest.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn check_destination(&self, dst: &dyn Cache<K, V>) -> Result<()> {
        if is_same_instance(self as *const Self as *const (), dst) {
            warn!("Rejected transfer of an LRU cache into itself");
            return Err(CacheError::SelfTransfer);
        }
        Ok(())
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut state = self.inner.write();
        state.get(key).map(|entry| entry.value.clone())
    }

    fn get_all(&self) -> HashMap<K, V> {
        let state = self.inner.read();
        let now = Instant::now();
        state
            .order
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(_, entry)| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    fn set(&self, key: K, value: V) {
        self.set_with_timeout(key, value, Duration::ZERO);
    }

    fn set_with_timeout(&self, key: K, value: V, timeout: Duration) {
        self.inner
            .write()
            .upsert(self.capacity, key, value, timeout);
    }

    fn not_found_set(&self, key: K, value: V) -> bool {
        self.not_found_set_with_timeout(key, value, Duration::ZERO)
    }

    fn not_found_set_with_timeout(&self, key: K, value: V, timeout: Duration) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let mut state = self.inner.write();
        if state.contains_live(&key) {
            return false;
        }
        state.upsert(self.capacity, key, value, timeout);
        true
    }

    fn delete(&self, key: &K) {
        self.inner.write().remove(key);
    }

    fn keys(&self) -> Vec<K> {
        self.inner.read().index.keys().cloned().collect()
    }

    fn purge(&self) {
        let mut state = self.inner.write();
        state.index.clear();
        state.order.clear();
        state.stats = CacheStats::new();
    }

    fn count(&self) -> usize {
        let state = self.inner.read();
        let now = Instant::now();
        state
            .order
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .count()
    }

    fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Holds this cache's lock for the whole move, calling `dst`'s own setters.
    ///
    /// Entries arrive in `dst` least recently used first, so its recency order
    /// mirrors this cache's.
    fn transfer_to(&self, dst: &dyn Cache<K, V>) -> Result<()> {
        self.check_destination(dst)?;

        let mut state = self.inner.write();
        let now = Instant::now();
        let slots = state.live_slots(now);
        let moved = slots.len();

        for slot in slots {
            if let Some(entry) = state.order.remove(slot) {
                state.index.remove(&entry.key);
                let remaining = entry.ttl_remaining_at(now);
                forward_entry(dst, entry.key, entry.value, remaining);
            }
        }

        debug!("LRU transfer: moved {} entries", moved);
        Ok(())
    }

    fn copy_to(&self, dst: &dyn Cache<K, V>) -> Result<()> {
        self.check_destination(dst)?;

        let state = self.inner.write();
        let now = Instant::now();
        let slots = state.live_slots(now);
        let copied = slots.len();

        for slot in slots {
            if let Some(entry) = state.order.get(slot) {
                forward_entry(
                    dst,
                    entry.key.clone(),
                    entry.value.clone(),
                    entry.ttl_remaining_at(now),
                );
            }
        }

        debug!("LRU copy: copied {} entries", copied);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        let state = self.inner.read();
        state.stats.snapshot(state.index.len())
    }
}

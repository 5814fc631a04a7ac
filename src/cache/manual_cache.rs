//! Manual Cache Module
//!
//! Cache engine over a plain HashMap. Expired entries are dropped lazily on
//! access, preferred during eviction, and optionally swept in the background.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{forward_entry, is_same_instance, Cache, CacheEntry, CacheStats};
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_sweeper, ExpirySweep, Sweeper};

#[derive(Debug)]
struct ManualState<K, V> {
    index: HashMap<K, CacheEntry<K, V>>,
    stats: CacheStats,
}

impl<K, V> ManualState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            stats: CacheStats::new(),
        }
    }

    fn get(&mut self, key: &K) -> Option<&CacheEntry<K, V>> {
        let expired = match self.index.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.index.remove(key);
            self.stats.record_miss();
            self.stats.record_expirations(1);
            return None;
        }

        self.stats.record_hit();
        self.index.get(key)
    }

    /// Whether `key` is stored and live. Drops it if it is stored but expired.
    fn contains_live(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(entry) if entry.is_expired() => {
                self.index.remove(key);
                self.stats.record_expirations(1);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn upsert(&mut self, capacity: usize, key: K, value: V, timeout: Duration) {
        if capacity == 0 {
            return;
        }

        if let Some(entry) = self.index.get_mut(&key) {
            entry.refresh(value, timeout);
            return;
        }

        if self.index.len() >= capacity {
            let excess = self.index.len() + 1 - capacity;
            self.evict(excess);
        }

        self.index
            .insert(key.clone(), CacheEntry::new(key, value, timeout));
    }

    // == Evict ==
    /// Removes up to `n` entries, expired ones first, then whichever the
    /// map's (randomly seeded) iteration order yields.
    ///
    /// Returns how many entries were removed.
    fn evict(&mut self, n: usize) -> usize {
        let now = Instant::now();
        let mut victims: Vec<K> = self
            .index
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .take(n)
            .map(|entry| entry.key.clone())
            .collect();
        let expired = victims.len();

        if expired < n {
            victims.extend(
                self.index
                    .values()
                    .filter(|entry| !entry.is_expired_at(now))
                    .take(n - expired)
                    .map(|entry| entry.key.clone()),
            );
        }

        for key in &victims {
            self.index.remove(key);
        }

        self.stats.record_expirations(expired);
        for _ in expired..victims.len() {
            self.stats.record_eviction();
        }
        debug!(
            "Manual eviction: removed {} expired and {} live entries",
            expired,
            victims.len() - expired
        );
        victims.len()
    }

    /// Live entries as (key, value, remaining lifetime) at `now`.
    fn live_entries(&self, now: Instant) -> Vec<(K, V, Option<Duration>)>
    where
        V: Clone,
    {
        self.index
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| {
                (
                    entry.key.clone(),
                    entry.value.clone(),
                    entry.ttl_remaining_at(now),
                )
            })
            .collect()
    }
}

/// State shared with the background sweeper.
#[derive(Debug)]
struct ManualShared<K, V> {
    capacity: usize,
    state: RwLock<ManualState<K, V>>,
}

impl<K, V> ExpirySweep for ManualShared<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Scans under the read lock, then deletes under the write lock.
    ///
    /// Candidates are re-checked before removal so an entry refreshed between
    /// the two phases survives.
    fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let candidates: Vec<K> = self
            .state
            .read()
            .index
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        if candidates.is_empty() {
            return 0;
        }

        let mut state = self.state.write();
        let now = Instant::now();
        let mut removed = 0;
        for key in candidates {
            if state.index.get(&key).is_some_and(|entry| entry.is_expired_at(now)) {
                state.index.remove(&key);
                removed += 1;
            }
        }
        state.stats.record_expirations(removed);
        removed
    }
}

// == Manual Cache ==
/// Loosely bounded cache that evicts expired entries first, then arbitrary ones.
///
/// When built with a non-zero sweep interval, a background task removes
/// expired entries on that interval until [`Cache::purge`] is called or the
/// cache is dropped. A capacity of zero stores nothing.
pub struct ManualCache<K, V> {
    shared: Arc<ManualShared<K, V>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<K, V> ManualCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an empty cache without a background sweep.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(ManualShared {
                capacity,
                state: RwLock::new(ManualState::new()),
            }),
            sweeper: Mutex::new(None),
        }
    }

    /// Creates an empty cache that sweeps expired entries every `interval`.
    ///
    /// A zero interval disables the sweep.
    ///
    /// # Errors
    /// Returns [`CacheError::SweeperSpawn`] if the sweeper thread cannot be started.
    pub fn with_sweep_interval(capacity: usize, interval: Duration) -> Result<Self> {
        let cache = Self::new(capacity);
        if !interval.is_zero() {
            let sweeper = spawn_sweeper(Arc::downgrade(&cache.shared), interval)?;
            *cache.sweeper.lock() = Some(sweeper);
        }
        Ok(cache)
    }

    // == Capacity ==
    /// Maximum number of entries the cache holds before evicting.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Whether a background sweep is currently attached.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|sweeper| !sweeper.is_stopped())
    }

    fn check_destination(&self, dst: &dyn Cache<K, V>) -> Result<()> {
        if is_same_instance(self as *const Self as *const (), dst) {
            warn!("Rejected transfer of a manual cache into itself");
            return Err(CacheError::SelfTransfer);
        }
        Ok(())
    }
}

impl<K, V> Cache<K, V> for ManualCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut state = self.shared.state.write();
        state.get(key).map(|entry| entry.value.clone())
    }

    fn get_all(&self) -> HashMap<K, V> {
        let state = self.shared.state.read();
        let now = Instant::now();
        state
            .index
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    fn set(&self, key: K, value: V) {
        self.set_with_timeout(key, value, Duration::ZERO);
    }

    fn set_with_timeout(&self, key: K, value: V, timeout: Duration) {
        let capacity = self.shared.capacity;
        if capacity == 0 {
            return;
        }
        self.shared
            .state
            .write()
            .upsert(capacity, key, value, timeout);
    }

    fn not_found_set(&self, key: K, value: V) -> bool {
        self.not_found_set_with_timeout(key, value, Duration::ZERO)
    }

    fn not_found_set_with_timeout(&self, key: K, value: V, timeout: Duration) -> bool {
        let capacity = self.shared.capacity;
        if capacity == 0 {
            return false;
        }

        let mut state = self.shared.state.write();
        if state.contains_live(&key) {
            return false;
        }
        state.upsert(capacity, key, value, timeout);
        true
    }

    fn delete(&self, key: &K) {
        self.shared.state.write().index.remove(key);
    }

    fn keys(&self) -> Vec<K> {
        self.shared.state.read().index.keys().cloned().collect()
    }

    /// Stops the background sweep, if any, then drops every entry.
    ///
    /// The cache stays usable afterwards but no longer sweeps.
    fn purge(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
            info!("Expiry sweeper stopped by purge");
        }

        let mut state = self.shared.state.write();
        state.index.clear();
        state.stats = CacheStats::new();
    }

    fn count(&self) -> usize {
        let state = self.shared.state.read();
        let now = Instant::now();
        state
            .index
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    fn len(&self) -> usize {
        self.shared.state.read().index.len()
    }

    /// Empties this cache in one locked step, then writes the live entries
    /// into `dst` without holding this cache's lock.
    ///
    /// Writes that land here after the drain stay here.
    fn transfer_to(&self, dst: &dyn Cache<K, V>) -> Result<()> {
        self.check_destination(dst)?;

        let now = Instant::now();
        let drained = {
            let mut state = self.shared.state.write();
            let drained = std::mem::take(&mut state.index);
            let expired = drained
                .values()
                .filter(|entry| entry.is_expired_at(now))
                .count();
            state.stats.record_expirations(expired);
            drained
        };

        let mut moved = 0;
        for entry in drained.into_values() {
            if entry.is_expired_at(now) {
                continue;
            }
            let remaining = entry.ttl_remaining_at(now);
            forward_entry(dst, entry.key, entry.value, remaining);
            moved += 1;
        }

        debug!("Manual transfer: moved {} entries", moved);
        Ok(())
    }

    /// Snapshots live entries under the read lock, then writes them into `dst`.
    fn copy_to(&self, dst: &dyn Cache<K, V>) -> Result<()> {
        self.check_destination(dst)?;

        let now = Instant::now();
        let snapshot = self.shared.state.read().live_entries(now);
        let copied = snapshot.len();

        for (key, value, remaining) in snapshot {
            forward_entry(dst, key, value, remaining);
        }

        debug!("Manual copy: copied {} entries", copied);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        let state = self.shared.state.read();
        state.stats.snapshot(state.index.len())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruCache;
    use std::thread::sleep;

    fn sorted_keys(cache: &ManualCache<&'static str, i32>) -> Vec<&'static str> {
        let mut keys = cache.keys();
        keys.sort();
        keys
    }

    #[test]
    fn test_manual_cache_new() {
        let cache: ManualCache<&str, i32> = ManualCache::new(10);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 10);
        assert!(!cache.is_sweeping());
    }

    #[test]
    fn test_set_get_overwrite() {
        let cache = ManualCache::new(10);

        cache.set("k", 1);
        cache.set("k", 2);

        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = ManualCache::new(3);

        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            cache.set(key, i as i32);
            assert!(cache.len() <= 3);
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&"e"), Some(4), "newest entry is always kept");
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let cache = ManualCache::new(2);

        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 3);

        assert_eq!(sorted_keys(&cache), vec!["a", "b"]);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_eviction_prefers_expired() {
        let cache = ManualCache::new(3);

        cache.set("a", 1);
        cache.set_with_timeout("short", 2, Duration::from_millis(10));
        cache.set("b", 3);
        sleep(Duration::from_millis(30));

        cache.set("c", 4);

        assert_eq!(sorted_keys(&cache), vec!["a", "b", "c"]);
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_evict_n_expired_then_arbitrary() {
        let cache = ManualCache::new(10);

        cache.set_with_timeout("x1", 1, Duration::from_millis(10));
        cache.set_with_timeout("x2", 2, Duration::from_millis(10));
        cache.set("live1", 3);
        cache.set("live2", 4);
        sleep(Duration::from_millis(30));

        let removed = cache.shared.state.write().evict(3);

        assert_eq!(removed, 3);
        let keys = cache.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("live"));
    }

    #[test]
    fn test_evict_more_than_stored() {
        let cache = ManualCache::new(10);
        cache.set("a", 1);

        let removed = cache.shared.state.write().evict(5);

        assert_eq!(removed, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lazy_expiry_on_get() {
        let cache = ManualCache::new(10);

        cache.set_with_timeout("x", 1, Duration::from_millis(50));
        sleep(Duration::from_millis(60));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.count(), 0);
        assert_eq!(cache.get(&"x"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_not_found_set() {
        let cache = ManualCache::new(10);

        assert!(cache.not_found_set("k", 1));
        assert!(!cache.not_found_set_with_timeout("k", 2, Duration::from_secs(1)));
        assert_eq!(cache.get(&"k"), Some(1));
    }

    #[test]
    fn test_not_found_set_replaces_expired() {
        let cache = ManualCache::new(10);

        assert!(cache.not_found_set_with_timeout("k", 1, Duration::from_millis(10)));
        sleep(Duration::from_millis(30));
        assert_eq!(cache.len(), 1);

        assert!(cache.not_found_set("k", 2));
        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_noop() {
        let cache = ManualCache::new(0);

        cache.set("a", 1);
        cache.set_with_timeout("b", 2, Duration::from_secs(1));

        assert!(!cache.not_found_set("c", 3));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete_and_purge() {
        let cache = ManualCache::new(10);

        cache.set("a", 1);
        cache.set("b", 2);
        cache.delete(&"a");
        assert_eq!(sorted_keys(&cache), vec!["b"]);

        cache.purge();
        cache.purge();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.count(), 0);

        cache.set("c", 3);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_remove_expired_keeps_live() {
        let cache = ManualCache::new(10);

        cache.set("keep", 1);
        cache.set_with_timeout("drop", 2, Duration::from_millis(10));
        sleep(Duration::from_millis(30));

        assert_eq!(cache.shared.remove_expired(), 1);
        assert_eq!(sorted_keys(&cache), vec!["keep"]);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_sweep_without_runtime() {
        let cache: ManualCache<&str, i32> =
            ManualCache::with_sweep_interval(10, Duration::from_millis(20)).unwrap();
        assert!(cache.is_sweeping());

        cache.set_with_timeout("x", 1, Duration::from_millis(10));
        cache.set("y", 2);
        sleep(Duration::from_millis(120));

        assert_eq!(cache.len(), 1, "sweeper removed the expired entry");
        cache.purge();
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_sweep_inside_runtime() {
        let cache: ManualCache<&str, i32> =
            ManualCache::with_sweep_interval(10, Duration::from_millis(20)).unwrap();

        cache.set_with_timeout("x", 1, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_no_sweep_after_purge() {
        let cache: ManualCache<&str, i32> =
            ManualCache::with_sweep_interval(10, Duration::from_millis(20)).unwrap();

        cache.purge();
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.set_with_timeout("x", 1, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.len(), 1, "expired entry lingers once sweeping stopped");
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_sweep_outlives_constructing_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let cache: ManualCache<&str, i32> = runtime.block_on(async {
            ManualCache::with_sweep_interval(10, Duration::from_millis(20)).unwrap()
        });
        drop(runtime);

        cache.set_with_timeout("x", 1, Duration::from_millis(10));
        sleep(Duration::from_millis(200));

        assert_eq!(cache.len(), 0, "sweep kept running after the runtime was dropped");
        assert!(cache.is_sweeping());
    }

    #[test]
    fn test_zero_interval_disables_sweep() {
        let cache: ManualCache<&str, i32> =
            ManualCache::with_sweep_interval(10, Duration::ZERO).unwrap();
        assert!(!cache.is_sweeping());
    }

    #[test]
    fn test_transfer_to_lru() {
        let src = ManualCache::new(10);
        let dst: LruCache<&str, i32> = LruCache::new(10);

        src.set("a", 1);
        src.set_with_timeout("b", 2, Duration::from_secs(60));
        src.set_with_timeout("dead", 3, Duration::from_millis(10));
        sleep(Duration::from_millis(30));

        src.transfer_to(&dst).unwrap();

        assert!(src.is_empty());
        assert_eq!(dst.get(&"a"), Some(1));
        assert_eq!(dst.get(&"b"), Some(2));
        assert_eq!(dst.get(&"dead"), None);
    }

    #[test]
    fn test_copy_to_keeps_source() {
        let src = ManualCache::new(10);
        let dst: ManualCache<&str, i32> = ManualCache::new(10);

        src.set("a", 1);
        src.copy_to(&dst).unwrap();

        assert_eq!(src.get(&"a"), Some(1));
        assert_eq!(dst.get(&"a"), Some(1));
    }

    #[test]
    fn test_self_transfer_is_rejected() {
        let cache = ManualCache::new(10);
        cache.set("a", 1);

        assert!(matches!(cache.transfer_to(&cache), Err(CacheError::SelfTransfer)));
        assert!(matches!(cache.copy_to(&cache), Err(CacheError::SelfTransfer)));
        assert_eq!(cache.len(), 1);
    }
}

//! Cache Module
//!
//! Provides the shared cache contract and its two engines: a strict LRU cache
//! and a manually bounded cache with lazy and swept expiry.

mod entry;
mod lru;
mod lru_cache;
mod manual_cache;
mod stats;


use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

// Re-export public types
pub use entry::CacheEntry;
pub use lru::{Iter as LruIter, LruList};
pub use lru_cache::LruCache;
pub use manual_cache::ManualCache;
pub use stats::CacheStats;

// == Cache Contract ==
/// Capability set shared by every cache engine.
///
/// All methods take `&self`; engines synchronise internally, so a cache can be
/// shared across threads behind an `Arc`. A zero `timeout` means the entry
/// never expires.
pub trait Cache<K, V>: Send + Sync {
    /// Returns the value for `key` if present and not expired.
    ///
    /// Expired entries found here are removed.
    fn get(&self, key: &K) -> Option<V>;

    /// Snapshot of every live entry.
    fn get_all(&self) -> HashMap<K, V>;

    /// Inserts or replaces `key` with no expiry.
    fn set(&self, key: K, value: V);

    /// Inserts or replaces `key`, expiring `timeout` from now.
    fn set_with_timeout(&self, key: K, value: V, timeout: Duration);

    /// Inserts only if `key` is absent. Returns whether the insert happened.
    fn not_found_set(&self, key: K, value: V) -> bool;

    /// Like [`Cache::not_found_set`] with an expiry.
    fn not_found_set_with_timeout(&self, key: K, value: V, timeout: Duration) -> bool;

    /// Removes `key` if present; no-op otherwise.
    ///
    /// # Arguments
    /// * `key` - Key to remove, live or expired
    fn delete(&self, key: &K);

    /// All stored keys, including expired ones not yet removed. Unordered.
    fn keys(&self) -> Vec<K>;

    /// Removes every entry.
    fn purge(&self);

    /// Number of live entries. Scans the whole cache.
    fn count(&self) -> usize;

    /// Number of stored entries, expired or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every live entry into `dst`, leaving this cache without them.
    ///
    /// Fails with [`crate::error::CacheError::SelfTransfer`] if `dst` is this cache.
    fn transfer_to(&self, dst: &dyn Cache<K, V>) -> Result<()>;

    /// Copies every live entry into `dst`, leaving this cache untouched.
    fn copy_to(&self, dst: &dyn Cache<K, V>) -> Result<()>;

    /// Hit, miss, eviction and expiration counters.
    fn stats(&self) -> CacheStats;
}

/// Whether `dst` is the very same instance as `src`.
pub(crate) fn is_same_instance<T: ?Sized>(src: *const (), dst: &T) -> bool {
    std::ptr::eq(src, dst as *const T as *const ())
}

/// Writes one transferred entry into `dst`, keeping its remaining lifetime.
pub(crate) fn forward_entry<K, V>(
    dst: &dyn Cache<K, V>,
    key: K,
    value: V,
    remaining: Option<Duration>,
) {
    match remaining {
        Some(ttl) if !ttl.is_zero() => dst.set_with_timeout(key, value, ttl),
        // Deadline reached while in flight
        Some(_) => {}
        None => dst.set(key, value),
    }
}

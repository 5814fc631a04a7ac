//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with expiry support.

use std::time::{Duration, Instant};

// == Cache Entry ==
/// Represents a single cache entry with its key, value and optional deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    /// The key this entry is stored under
    pub key: K,
    /// The stored value
    pub value: V,
    /// Absolute expiry deadline, None = no expiration
    pub expire_at: Option<Instant>,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a new cache entry that expires `timeout` from now.
    ///
    /// A zero timeout means the entry never expires.
    pub fn new(key: K, value: V, timeout: Duration) -> Self {
        Self {
            key,
            value,
            expire_at: deadline_after(timeout),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at the given instant.
    ///
    /// Boundary condition: an entry is expired once `now >= expire_at`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expire_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Checks if the entry has expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns the lifetime left at `now`, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the deadline has passed
    /// - `Some(remaining)` if the entry is still live
    /// - `None` if the entry never expires
    pub fn ttl_remaining_at(&self, now: Instant) -> Option<Duration> {
        self.expire_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Overwrites the value and restarts the expiry clock.
    pub fn refresh(&mut self, value: V, timeout: Duration) {
        self.value = value;
        self.expire_at = deadline_after(timeout);
    }
}

// == Utility Functions ==
/// Converts a relative timeout into an absolute deadline.
///
/// Zero means "never". A timeout too large to represent also never expires.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    if timeout.is_zero() {
        None
    } else {
        Instant::now().checked_add(timeout)
    }
}

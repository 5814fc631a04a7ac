//! Configuration Module
//!
//! Handles cache construction parameters, loaded from environment variables
//! or assembled through [`CacheBuilder`].

use std::env;
use std::hash::Hash;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{LruCache, ManualCache};
use crate::error::{CacheError, Result};

/// Cache construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub capacity: usize,
    /// Background sweep interval; zero disables it. Ignored by the LRU engine.
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// Missing or malformed values fall back to the defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 1000)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds, 0 disables (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env::var("CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capacity),
            sweep_interval: env::var("CACHE_SWEEP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    /// Like [`CacheConfig::from_env`], but rejects malformed values.
    pub fn try_from_env() -> Result<Self> {
        let defaults = Self::default();
        let capacity = match env::var("CACHE_CAPACITY") {
            Ok(raw) => parse_var("CACHE_CAPACITY", &raw)?,
            Err(_) => defaults.capacity,
        };
        let sweep_interval = match env::var("CACHE_SWEEP_INTERVAL_MS") {
            Ok(raw) => Duration::from_millis(parse_var("CACHE_SWEEP_INTERVAL_MS", &raw)?),
            Err(_) => defaults.sweep_interval,
        };
        Ok(Self {
            capacity,
            sweep_interval,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| CacheError::InvalidConfig(format!("{}={}", name, raw)))
}

// == Cache Builder ==
/// Fluent builder producing either engine from one configuration.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use incache::{Cache, CacheBuilder};
///
/// let cache = CacheBuilder::new()
///     .capacity(2)
///     .build_lru::<&str, i32>();
/// cache.set("a", 1);
/// assert_eq!(cache.get(&"a"), Some(1));
///
/// let manual = CacheBuilder::new()
///     .capacity(100)
///     .sweep_interval(Duration::ZERO)
///     .build_manual::<String, String>()
///     .unwrap();
/// assert!(manual.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Builds an LRU cache. The sweep interval is ignored.
    pub fn build_lru<K, V>(&self) -> LruCache<K, V>
    where
        K: Eq + Hash + Clone,
    {
        LruCache::new(self.config.capacity)
    }

    /// Builds a manual cache, starting the sweeper when the interval is non-zero.
    pub fn build_manual<K, V>(&self) -> Result<ManualCache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        ManualCache::with_sweep_interval(self.config.capacity, self.config.sweep_interval)
    }
}

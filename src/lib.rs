//! incache - An in-process generic key-value cache
//!
//! Provides two engines behind one [`Cache`] contract: [`LruCache`], strictly
//! bounded with least-recently-used eviction, and [`ManualCache`], which
//! expires entries lazily and can sweep them in the background.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheEntry, CacheStats, LruCache, ManualCache};
pub use config::{CacheBuilder, CacheConfig};
pub use error::{CacheError, Result};

//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache library.
///
/// Lookups and inserts never fail; misses and refused inserts are reported
/// through `Option`/`bool`. Errors only cover misuse and setup failures.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A cache was asked to transfer or copy into itself
    #[error("Cannot transfer or copy a cache into itself")]
    SelfTransfer,

    /// The background sweep worker could not be started
    #[error("Failed to start sweep worker: {0}")]
    SweeperSpawn(#[from] std::io::Error),

    /// Configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache library.
pub type Result<T> = std::result::Result<T, CacheError>;

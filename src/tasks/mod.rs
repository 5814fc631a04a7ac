//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Expiry sweep: Removes expired cache entries at a configured interval

mod sweeper;

pub use sweeper::{spawn_sweeper, ExpirySweep, Sweeper};

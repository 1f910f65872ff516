//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a memoizer is alive.
//!
//! # Tasks
//! - TTL Eviction: Removes memory cells older than the configured maximum age

mod eviction;

pub use eviction::{spawn_eviction_task, Sweep};

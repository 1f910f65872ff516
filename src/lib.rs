//! Alzheimer - memoization that remembers more than values
//!
//! Caches the result of a function keyed by its first argument and replays it
//! on later calls: plain values, errors, byte streams (captured to scratch
//! storage) and deferred values. Cells can be forgotten after a time-to-live.

pub mod backing;
pub mod config;
pub mod error;
pub mod memo;
pub mod stream;
pub mod tasks;

pub use backing::{BackingStore, Handle, TempDirStore};
pub use config::{ForgetOptions, MemoConfig, MemoOptions};
pub use error::{ComputationError, MemoError, Result};
pub use memo::{remember, remember_with, CellKind, Deferred, MemoStats, Memoizer, Outcome, Replay};
pub use stream::{ByteStream, Encoding, ReplayStream, SourceStream, StreamMeta};
pub use tasks::spawn_eviction_task;

//! Memo Module
//!
//! The memory-cell state machine, the per-memoizer store of cells, and the
//! memoizer wrapping a function.

mod cell;
mod memoizer;
mod outcome;
mod stats;
mod store;


// Re-export public types
pub use cell::CellKind;
pub use memoizer::{remember, remember_with, Memoizer};
pub use outcome::{Deferred, Outcome, Replay};
pub use stats::MemoStats;

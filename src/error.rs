//! Error types for the memoizer
//!
//! Provides unified error handling using thiserror.

use std::io;
use std::sync::Arc;

use thiserror::Error;

// == Memo Error Enum ==
/// Unified error type for the memoizer.
///
/// Errors are cheap to clone so that one failure can be replayed to every
/// consumer of a cached stream.
#[derive(Error, Debug, Clone)]
pub enum MemoError {
    /// Invalid options or environment at wrap time
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The source stream failed before capture completed
    #[error("Stream capture failed: {0}")]
    StreamCapture(Arc<io::Error>),

    /// Reading from or writing to the backing store failed
    #[error("Backing store error: {0}")]
    BackingStore(Arc<io::Error>),
}

impl MemoError {
    pub(crate) fn stream_capture(err: io::Error) -> Self {
        MemoError::StreamCapture(Arc::new(err))
    }

    pub(crate) fn backing_store(err: io::Error) -> Self {
        MemoError::BackingStore(Arc::new(err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the memoizer.
pub type Result<T> = std::result::Result<T, MemoError>;

/// An error raised by the wrapped function, shared by every replay of its cell.
pub type ComputationError<E> = Arc<E>;

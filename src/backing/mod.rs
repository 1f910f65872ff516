//! Backing Store Module
//!
//! Durable scratch storage for captured streams, keyed by opaque handles.

mod temp_dir;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::stream::ByteStream;

pub use temp_dir::TempDirStore;

/// Read chunk size used when replaying a handle
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

// == Handle ==
/// Names one captured stream inside a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

impl Handle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Backing Store ==
/// Storage consumed by stream capture and replay.
///
/// A handle is written by exactly one producer and is only deleted by the
/// evictor or by a failed capture.
#[async_trait]
pub trait BackingStore: Send + Sync + fmt::Debug {
    /// Returns a handle no other capture in this store has used.
    fn allocate_handle(&self) -> Handle;

    /// Drains `source` into `handle`, returning the number of bytes written.
    ///
    /// Errors from `source` are reported as `StreamCapture`, errors from the
    /// store itself as `BackingStore`.
    async fn write_stream(&self, handle: &Handle, source: ByteStream) -> Result<u64>;

    /// Opens an independent reader over `handle`. The open is deferred until
    /// the stream is first polled.
    fn open_for_read(&self, handle: &Handle) -> ByteStream;

    /// Removes the data stored under `handle`.
    async fn delete(&self, handle: &Handle) -> Result<()>;
}

//! Stream Capture
//!
//! Drains a source stream into the backing store. The capture is a shared
//! future so the cell transition and every placeholder awaiting it observe
//! the same settlement.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::ByteStream;
use crate::backing::{BackingStore, Handle};
use crate::error::MemoError;

/// Settlement of one capture, awaitable from any number of places.
pub(crate) type CaptureFuture = Shared<BoxFuture<'static, Captured>>;

/// How a capture ended.
#[derive(Debug, Clone)]
pub(crate) enum Captured {
    /// Every byte of the source is stored under `handle`
    Stored { handle: Handle, bytes: u64 },
    /// The source or the store failed; nothing is kept
    Failed(MemoError),
}

/// Allocates a handle and returns the (not yet polled) capture of `source`.
///
/// The caller is responsible for spawning a clone of the returned future so the
/// capture runs even if nobody reads a placeholder.
pub(crate) fn start_capture(backing: Arc<dyn BackingStore>, source: ByteStream) -> CaptureFuture {
    let handle = backing.allocate_handle();

    async move {
        match backing.write_stream(&handle, source).await {
            Ok(bytes) => {
                debug!("Captured {} bytes into {}", bytes, handle);
                Captured::Stored { handle, bytes }
            }
            Err(err) => {
                warn!("Capture into {} failed: {}", handle, err);
                if let Err(delete_err) = backing.delete(&handle).await {
                    debug!("Could not remove partial capture {}: {}", handle, delete_err);
                }
                Captured::Failed(err)
            }
        }
    }
    .boxed()
    .shared()
}

//! Placeholder Stream
//!
//! Handed out while a capture is in flight. It yields nothing until the
//! capture settles, then forwards to the same replay a fresh projection of the
//! settled cell would produce.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use futures::FutureExt;

use super::capture::{CaptureFuture, Captured};
use super::replay::{failure_signal, stored_reader};
use crate::backing::BackingStore;
use crate::error::Result;

pub(crate) struct PlaceholderStream {
    /// Capture being waited on; None once it has settled
    pending: Option<CaptureFuture>,
    /// Replay currently forwarded to
    active: Option<BoxStream<'static, Result<Bytes>>>,
    backing: Arc<dyn BackingStore>,
}

impl PlaceholderStream {
    pub(crate) fn new(capture: CaptureFuture, backing: Arc<dyn BackingStore>) -> Self {
        Self {
            pending: Some(capture),
            active: None,
            backing,
        }
    }
}

impl Stream for PlaceholderStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(active) = this.active.as_mut() {
                return active.poll_next_unpin(cx);
            }

            let Some(pending) = this.pending.as_mut() else {
                return Poll::Ready(None);
            };
            let captured = ready!(pending.poll_unpin(cx));
            this.pending = None;
            this.active = Some(match captured {
                Captured::Stored { handle, .. } => stored_reader(&this.backing, &handle),
                Captured::Failed(err) => failure_signal(err),
            });
        }
    }
}

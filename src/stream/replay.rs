//! Replay Stream
//!
//! The caller-facing stream produced by projecting a stream cell. Every
//! projection is an independent reader decorated with the source stream's
//! descriptive properties.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use super::capture::CaptureFuture;
use super::placeholder::PlaceholderStream;
use super::{Encoding, StreamMeta};
use crate::backing::{BackingStore, Handle};
use crate::error::{MemoError, Result};

// == Replay Stream ==
/// An independent readable view of a cached stream.
pub struct ReplayStream {
    meta: Arc<StreamMeta>,
    placeholder: bool,
    inner: BoxStream<'static, Result<Bytes>>,
}

impl ReplayStream {
    /// Stream standing in for a capture that has not settled yet.
    pub(crate) fn placeholder(
        meta: Arc<StreamMeta>,
        capture: CaptureFuture,
        backing: Arc<dyn BackingStore>,
    ) -> Self {
        Self {
            meta,
            placeholder: true,
            inner: PlaceholderStream::new(capture, backing).boxed(),
        }
    }

    /// Fresh reader over a captured handle.
    pub(crate) fn captured(
        meta: Arc<StreamMeta>,
        backing: &Arc<dyn BackingStore>,
        handle: &Handle,
    ) -> Self {
        Self {
            meta,
            placeholder: false,
            inner: stored_reader(backing, handle),
        }
    }

    /// Stream that signals `error` on the next poll after a yield and never
    /// produces data.
    pub(crate) fn failed(meta: Arc<StreamMeta>, error: MemoError) -> Self {
        Self {
            meta,
            placeholder: false,
            inner: failure_signal(error),
        }
    }

    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    pub fn encoding(&self) -> Option<Encoding> {
        self.meta.encoding
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.meta.property(name)
    }

    /// True if this stream was handed out before its capture settled.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Reads the stream to completion.
    pub async fn read_to_end(self) -> Result<Bytes> {
        let buf = self
            .inner
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Reads the stream to completion and decodes it with the stream's
    /// encoding, falling back to UTF-8.
    pub async fn read_to_string(self) -> Result<String> {
        let encoding = self.meta.encoding.unwrap_or(Encoding::Utf8);
        let bytes = self.read_to_end().await?;
        Ok(encoding.decode(&bytes))
    }
}

impl Stream for ReplayStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for ReplayStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayStream")
            .field("meta", &self.meta)
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

pub(super) fn stored_reader(
    backing: &Arc<dyn BackingStore>,
    handle: &Handle,
) -> BoxStream<'static, Result<Bytes>> {
    backing
        .open_for_read(handle)
        .map_err(MemoError::backing_store)
        .boxed()
}

pub(super) fn failure_signal(error: MemoError) -> BoxStream<'static, Result<Bytes>> {
    stream::once(async move {
        tokio::task::yield_now().await;
        Err(error)
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::TempDirStore;
    use crate::stream::start_capture;
    use std::io;

    fn meta() -> Arc<StreamMeta> {
        let mut meta = StreamMeta::default();
        meta.encoding = Some(Encoding::Utf8);
        meta.properties
            .insert("path".to_string(), "fixtures/abc.txt".to_string());
        Arc::new(meta)
    }

    fn backing() -> Arc<dyn BackingStore> {
        Arc::new(TempDirStore::new().unwrap())
    }

    fn source(parts: Vec<io::Result<Bytes>>) -> crate::stream::ByteStream {
        stream::iter(parts).boxed()
    }

    #[tokio::test]
    async fn test_failed_stream_yields_only_error() {
        let err = MemoError::stream_capture(io::Error::new(io::ErrorKind::Other, "E"));
        let mut replay = ReplayStream::failed(meta(), err);

        let first = replay.next().await;
        assert!(matches!(first, Some(Err(MemoError::StreamCapture(_)))));
        assert!(replay.next().await.is_none());
    }

    #[tokio::test]
    async fn test_placeholder_replays_capture() {
        let backing = backing();
        let capture = start_capture(
            backing.clone(),
            source(vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"c"))]),
        );
        let driver = tokio::spawn(capture.clone());

        let replay = ReplayStream::placeholder(meta(), capture, backing);
        assert!(replay.is_placeholder());
        assert_eq!(replay.property("path"), Some("fixtures/abc.txt"));
        assert_eq!(replay.read_to_string().await.unwrap(), "abc");

        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_placeholder_drives_capture_itself() {
        let backing = backing();
        let capture = start_capture(backing.clone(), source(vec![Ok(Bytes::from_static(b"xyz"))]));

        let replay = ReplayStream::placeholder(meta(), capture, backing);
        assert_eq!(&replay.read_to_end().await.unwrap()[..], b"xyz");
    }

    #[tokio::test]
    async fn test_placeholder_signals_capture_error() {
        let backing = backing();
        let capture = start_capture(
            backing.clone(),
            source(vec![
                Ok(Bytes::from_static(b"lost")),
                Err(io::Error::new(io::ErrorKind::Other, "E")),
            ]),
        );

        let mut replay = ReplayStream::placeholder(meta(), capture, backing);
        assert!(matches!(
            replay.next().await,
            Some(Err(MemoError::StreamCapture(_)))
        ));
        assert!(replay.next().await.is_none());
    }

    #[tokio::test]
    async fn test_captured_replays_are_independent() {
        let backing = backing();
        let handle = backing.allocate_handle();
        backing
            .write_stream(&handle, source(vec![Ok(Bytes::from_static(b"abc"))]))
            .await
            .unwrap();

        let mut first = ReplayStream::captured(meta(), &backing, &handle);
        let second = ReplayStream::captured(meta(), &backing, &handle);

        // Partially consume the first view
        let chunk = first.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"abc");

        assert_eq!(second.read_to_string().await.unwrap(), "abc");
        assert!(!first.is_placeholder());
    }

    #[tokio::test]
    async fn test_read_to_string_uses_encoding() {
        let backing = backing();
        let handle = backing.allocate_handle();
        backing
            .write_stream(&handle, source(vec![Ok(Bytes::from_static(&[0x63, 0xe9]))]))
            .await
            .unwrap();

        let mut latin1 = StreamMeta::default();
        latin1.encoding = Some(Encoding::Latin1);
        let replay = ReplayStream::captured(Arc::new(latin1), &backing, &handle);

        assert_eq!(replay.encoding(), Some(Encoding::Latin1));
        assert_eq!(replay.read_to_string().await.unwrap(), "cé");
    }
}

//! Temporary Directory Store
//!
//! Backing store writing each handle to a file inside a private temporary
//! directory owned by the store instance.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{stream, StreamExt, TryStreamExt};
use tempfile::TempDir;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::{BackingStore, Handle, READ_CHUNK_SIZE};
use crate::error::{MemoError, Result};
use crate::stream::ByteStream;

// == Temp Dir Store ==
/// File-per-handle store; the directory is removed when the store is dropped.
#[derive(Debug)]
pub struct TempDirStore {
    dir: TempDir,
    next_id: AtomicU64,
}

impl TempDirStore {
    /// Creates a store in a fresh directory under the system temp location.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("alzheimer-")
            .tempdir()
            .map_err(MemoError::backing_store)?;
        debug!("Backing store created at {}", dir.path().display());

        Ok(Self {
            dir,
            next_id: AtomicU64::new(0),
        })
    }

    /// Directory holding the captured streams.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn path_for(&self, handle: &Handle) -> PathBuf {
        self.dir.path().join(handle.as_str())
    }
}

#[async_trait]
impl BackingStore for TempDirStore {
    fn allocate_handle(&self) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Handle::new(format!("stream-{:06}", id))
    }

    async fn write_stream(&self, handle: &Handle, mut source: ByteStream) -> Result<u64> {
        let mut file = File::create(self.path_for(handle))
            .await
            .map_err(MemoError::backing_store)?;
        let mut written = 0u64;

        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(MemoError::stream_capture)?;
            file.write_all(&chunk)
                .await
                .map_err(MemoError::backing_store)?;
            written += chunk.len() as u64;
        }

        // tokio files complete writes in the background until flushed
        file.flush().await.map_err(MemoError::backing_store)?;
        Ok(written)
    }

    fn open_for_read(&self, handle: &Handle) -> ByteStream {
        let path = self.path_for(handle);
        stream::once(async move { File::open(path).await })
            .map_ok(read_chunks)
            .try_flatten()
            .boxed()
    }

    async fn delete(&self, handle: &Handle) -> Result<()> {
        fs::remove_file(self.path_for(handle))
            .await
            .map_err(MemoError::backing_store)
    }
}

/// Reads `file` to the end in `READ_CHUNK_SIZE` pieces.
fn read_chunks(file: File) -> ByteStream {
    stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        match file.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(buf.freeze()), Some(file))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io;

    fn chunks(parts: &[&'static str]) -> ByteStream {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<io::Result<Bytes>>>(),
        )
        .boxed()
    }

    async fn read_all(stream: ByteStream) -> io::Result<Vec<u8>> {
        let parts: Vec<Bytes> = stream.try_collect().await?;
        Ok(parts.concat())
    }

    #[test]
    fn test_allocate_unique_handles() {
        let store = TempDirStore::new().unwrap();
        let a = store.allocate_handle();
        let b = store.allocate_handle();
        assert_ne!(a, b);
    }

    #[test]
    fn test_stores_do_not_share_directories() {
        let a = TempDirStore::new().unwrap();
        let b = TempDirStore::new().unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = TempDirStore::new().unwrap();
        let handle = store.allocate_handle();

        let written = store
            .write_stream(&handle, chunks(&["ab", "c"]))
            .await
            .unwrap();
        assert_eq!(written, 3);

        let data = read_all(store.open_for_read(&handle)).await.unwrap();
        assert_eq!(data, b"abc");
    }

    #[tokio::test]
    async fn test_readers_are_independent() {
        let store = TempDirStore::new().unwrap();
        let handle = store.allocate_handle();
        store
            .write_stream(&handle, chunks(&["hello"]))
            .await
            .unwrap();

        let first = store.open_for_read(&handle);
        let second = store.open_for_read(&handle);

        assert_eq!(read_all(first).await.unwrap(), b"hello");
        assert_eq!(read_all(second).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_source_error_is_stream_capture() {
        let store = TempDirStore::new().unwrap();
        let handle = store.allocate_handle();
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"a")),
            Err(io::Error::new(io::ErrorKind::Other, "broken pipe")),
        ])
        .boxed();

        let result = store.write_stream(&handle, source).await;
        assert!(matches!(result, Err(MemoError::StreamCapture(_))));
    }

    #[tokio::test]
    async fn test_delete_then_read_fails() {
        let store = TempDirStore::new().unwrap();
        let handle = store.allocate_handle();
        store.write_stream(&handle, chunks(&["x"])).await.unwrap();

        store.delete(&handle).await.unwrap();

        let result = read_all(store.open_for_read(&handle)).await;
        assert!(result.is_err());
        assert!(matches!(
            store.delete(&handle).await,
            Err(MemoError::BackingStore(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let store = TempDirStore::new().unwrap();
        let handle = store.allocate_handle();

        let written = store.write_stream(&handle, chunks(&[])).await.unwrap();
        assert_eq!(written, 0);
        assert!(read_all(store.open_for_read(&handle)).await.unwrap().is_empty());
    }
}

//! Stream Module
//!
//! Source streams returned by wrapped functions, their capture into the
//! backing store, and the replay streams handed back to callers.

mod capture;
mod placeholder;
mod replay;

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

pub(crate) use capture::{start_capture, CaptureFuture, Captured};
pub use replay::ReplayStream;

/// Byte stream as produced by wrapped functions and backing stores.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

// == Encoding ==
/// Text decoding applied to a stream's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    /// Decodes `bytes` as text. Invalid UTF-8 is replaced, never rejected.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

// == Stream Meta ==
/// Descriptive properties of a stream, copied onto every replay of it.
///
/// Never carries listeners or control state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMeta {
    /// Active text decoding, if any
    pub encoding: Option<Encoding>,
    /// Free-form descriptive properties such as a path or content type
    pub properties: BTreeMap<String, String>,
}

impl StreamMeta {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

// == Source Stream ==
/// A live byte stream returned by a wrapped function.
pub struct SourceStream {
    meta: StreamMeta,
    inner: ByteStream,
}

impl SourceStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            meta: StreamMeta::default(),
            inner: stream.boxed(),
        }
    }

    /// Marks the stream's bytes as text in `encoding`.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.meta.encoding = Some(encoding);
        self
    }

    /// Attaches a descriptive property carried over to replays.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.properties.insert(name.into(), value.into());
        self
    }

    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    pub(crate) fn into_parts(self) -> (StreamMeta, ByteStream) {
        (self.meta, self.inner)
    }
}

impl fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceStream")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_decode_utf8() {
        assert_eq!(Encoding::Utf8.decode("héllo".as_bytes()), "héllo");
        assert_eq!(Encoding::Utf8.decode(&[0x61, 0xff]), "a\u{fffd}");
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(Encoding::Latin1.decode(&[0x63, 0x61, 0x66, 0xe9]), "café");
    }

    #[test]
    fn test_source_meta_builders() {
        let source = SourceStream::new(stream::empty::<io::Result<Bytes>>())
            .with_encoding(Encoding::Utf8)
            .with_property("path", "/tmp/report.txt");

        assert_eq!(source.meta().encoding, Some(Encoding::Utf8));
        assert_eq!(source.meta().property("path"), Some("/tmp/report.txt"));
        assert_eq!(source.meta().property("missing"), None);
    }

    #[test]
    fn test_encoding_serde_names() {
        let json = serde_json::to_string(&Encoding::Latin1).unwrap();
        assert_eq!(json, r#""latin1""#);
    }
}

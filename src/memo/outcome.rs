//! Outcomes and Replays
//!
//! `Outcome` is what a wrapped function produces; `Replay` is what every call
//! of the memoized function hands back.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};

use crate::error::ComputationError;
use crate::stream::{ReplayStream, SourceStream};

// == Outcome ==
/// A successful result of the wrapped function, tagged by shape.
pub enum Outcome<T, E> {
    /// A plain value, replayed by cloning
    Value(T),
    /// A live byte stream, captured for replay
    Stream(SourceStream),
    /// A value that settles later; `Err` is a rejection
    Deferred(BoxFuture<'static, Result<Outcome<T, E>, E>>),
}

impl<T, E> Outcome<T, E> {
    pub fn value(value: T) -> Self {
        Outcome::Value(value)
    }

    pub fn stream(source: SourceStream) -> Self {
        Outcome::Stream(source)
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Outcome<T, E>, E>> + Send + 'static,
    {
        Outcome::Deferred(future.boxed())
    }
}

impl<T, E> From<SourceStream> for Outcome<T, E> {
    fn from(source: SourceStream) -> Self {
        Outcome::Stream(source)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Outcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Stream(source) => f.debug_tuple("Stream").field(source).finish(),
            Outcome::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

// == Replay ==
/// The caller-facing projection of a memory cell.
pub enum Replay<T, E> {
    Value(T),
    Stream(ReplayStream),
    Deferred(Deferred<T, E>),
}

impl<T, E> Replay<T, E> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Replay::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_stream(self) -> Option<ReplayStream> {
        match self {
            Replay::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn into_deferred(self) -> Option<Deferred<T, E>> {
        match self {
            Replay::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    /// Waits for a deferred replay to settle; other replays are returned as is.
    pub async fn settle(self) -> Result<Replay<T, E>, ComputationError<E>> {
        match self {
            Replay::Deferred(deferred) => deferred.await,
            replay => Ok(replay),
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Replay<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replay::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Replay::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
            Replay::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

// == Deferred ==
/// A replayed deferred value. Resolves to the projection of the settled
/// result; nested deferred values are flattened.
pub struct Deferred<T, E> {
    inner: BoxFuture<'static, Result<Replay<T, E>, ComputationError<E>>>,
}

impl<T, E> Deferred<T, E> {
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Replay<T, E>, ComputationError<E>>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }
}

impl<T, E> Future for Deferred<T, E> {
    type Output = Result<Replay<T, E>, ComputationError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

//! Memory Cell Module
//!
//! One cached outcome and its state machine. A cell is born as `Value`,
//! `Error`, `Capturing` or `PendingPromise`; the transient states move exactly
//! once to a terminal state in the background:
//!
//! - `Capturing` -> `Stream` | `ErrorStream`
//! - `PendingPromise` -> `FulfilledPromise` | `RejectedPromise`
//!
//! Projection reads the current state under a read lock, so a caller racing a
//! transition sees either the old or the new state, never a mix.

use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::outcome::{Deferred, Outcome, Replay};
use crate::backing::{BackingStore, Handle};
use crate::error::{ComputationError, MemoError};
use crate::stream::{start_capture, CaptureFuture, Captured, ReplayStream, StreamMeta};

// == Cell Kind ==
/// The observable state of a memory cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellKind {
    Value,
    Error,
    /// A stream result whose capture has not settled
    Capturing,
    Stream,
    ErrorStream,
    PendingPromise,
    FulfilledPromise,
    RejectedPromise,
}

impl CellKind {
    /// True once the cell can no longer change state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CellKind::Capturing | CellKind::PendingPromise)
    }
}

// == Memo Context ==
/// Everything a cell needs to start background work.
#[derive(Debug, Clone)]
pub(crate) struct MemoContext {
    pub(crate) runtime: RuntimeHandle,
    pub(crate) backing: Arc<dyn BackingStore>,
}

/// Result of a deferred value, shared by every replay awaiting it.
pub(crate) enum Settlement<T, E> {
    Fulfilled(Arc<MemoryCell<T, E>>),
    Rejected(ComputationError<E>),
}

impl<T, E> Clone for Settlement<T, E> {
    fn clone(&self) -> Self {
        match self {
            Settlement::Fulfilled(cell) => Settlement::Fulfilled(Arc::clone(cell)),
            Settlement::Rejected(err) => Settlement::Rejected(Arc::clone(err)),
        }
    }
}

type SettlementFuture<T, E> = Shared<BoxFuture<'static, Settlement<T, E>>>;

struct CapturingStream {
    capture: CaptureFuture,
    meta: Arc<StreamMeta>,
    backing: Arc<dyn BackingStore>,
}

struct CapturedStream {
    handle: Handle,
    meta: Arc<StreamMeta>,
    backing: Arc<dyn BackingStore>,
}

struct FailedStream {
    error: MemoError,
    meta: Arc<StreamMeta>,
}

enum CellState<T, E> {
    Value(T),
    Error(ComputationError<E>),
    Capturing(CapturingStream),
    Stream(CapturedStream),
    ErrorStream(FailedStream),
    PendingPromise(SettlementFuture<T, E>),
    FulfilledPromise(Arc<MemoryCell<T, E>>),
    RejectedPromise(ComputationError<E>),
}

/// Deferred release of a cell evicted before its state settled.
struct Release {
    grace: Duration,
    runtime: RuntimeHandle,
}

// == Memory Cell ==
pub(crate) struct MemoryCell<T, E> {
    state: RwLock<CellState<T, E>>,
    /// Creation time, set only when eviction is enabled
    created_at: Option<Instant>,
    /// Set when the cell is released while still capturing or pending
    released: OnceLock<Release>,
}

impl<T, E> MemoryCell<T, E> {
    pub(crate) fn created_at(&self) -> Option<Instant> {
        self.created_at
    }
}

impl<T, E> MemoryCell<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn with_state(state: CellState<T, E>, created_at: Option<Instant>) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(state),
            created_at,
            released: OnceLock::new(),
        })
    }

    /// Cell for an error raised by the wrapped function. Never transitions.
    pub(crate) fn failed(error: E, created_at: Option<Instant>) -> Arc<Self> {
        Self::with_state(CellState::Error(Arc::new(error)), created_at)
    }

    /// Cell for a successful outcome, starting any background capture or
    /// settlement tracking it needs on `ctx.runtime`.
    pub(crate) fn classify(
        outcome: Outcome<T, E>,
        ctx: &MemoContext,
        created_at: Option<Instant>,
    ) -> Arc<Self> {
        match outcome {
            Outcome::Value(value) => Self::with_state(CellState::Value(value), created_at),
            Outcome::Stream(source) => {
                let (meta, source) = source.into_parts();
                let capture = start_capture(Arc::clone(&ctx.backing), source);
                let cell = Self::with_state(
                    CellState::Capturing(CapturingStream {
                        capture: capture.clone(),
                        meta: Arc::new(meta),
                        backing: Arc::clone(&ctx.backing),
                    }),
                    created_at,
                );

                let tracked = Arc::clone(&cell);
                ctx.runtime.spawn(async move {
                    let captured = capture.await;
                    tracked.finish_capture(captured);
                });
                cell
            }
            Outcome::Deferred(future) => {
                let inner_ctx = ctx.clone();
                let settled: SettlementFuture<T, E> = async move {
                    match future.await {
                        Ok(outcome) => {
                            Settlement::Fulfilled(Self::classify(outcome, &inner_ctx, None))
                        }
                        Err(err) => Settlement::Rejected(Arc::new(err)),
                    }
                }
                .boxed()
                .shared();
                let cell =
                    Self::with_state(CellState::PendingPromise(settled.clone()), created_at);

                let tracked = Arc::clone(&cell);
                ctx.runtime.spawn(async move {
                    let settlement = settled.await;
                    tracked.settle(settlement);
                });
                cell
            }
        }
    }

    /// Turns the current state into a caller-facing replay.
    pub(crate) fn project(&self) -> Result<Replay<T, E>, ComputationError<E>> {
        match &*self.read_state() {
            CellState::Value(value) => Ok(Replay::Value(value.clone())),
            CellState::Error(err) => Err(Arc::clone(err)),
            CellState::Capturing(capturing) => Ok(Replay::Stream(ReplayStream::placeholder(
                Arc::clone(&capturing.meta),
                capturing.capture.clone(),
                Arc::clone(&capturing.backing),
            ))),
            CellState::Stream(captured) => Ok(Replay::Stream(ReplayStream::captured(
                Arc::clone(&captured.meta),
                &captured.backing,
                &captured.handle,
            ))),
            CellState::ErrorStream(failed) => Ok(Replay::Stream(ReplayStream::failed(
                Arc::clone(&failed.meta),
                failed.error.clone(),
            ))),
            CellState::PendingPromise(settled) => {
                let settled = settled.clone();
                Ok(Replay::Deferred(Deferred::new(async move {
                    resolve(settled.await).await
                })))
            }
            CellState::FulfilledPromise(inner) => Ok(Replay::Deferred(Deferred::new(resolve(
                Settlement::Fulfilled(Arc::clone(inner)),
            )))),
            CellState::RejectedPromise(err) => {
                let err = Arc::clone(err);
                Ok(Replay::Deferred(Deferred::new(async move { Err(err) })))
            }
        }
    }

    pub(crate) fn kind(&self) -> CellKind {
        match &*self.read_state() {
            CellState::Value(_) => CellKind::Value,
            CellState::Error(_) => CellKind::Error,
            CellState::Capturing(_) => CellKind::Capturing,
            CellState::Stream(_) => CellKind::Stream,
            CellState::ErrorStream(_) => CellKind::ErrorStream,
            CellState::PendingPromise(_) => CellKind::PendingPromise,
            CellState::FulfilledPromise(_) => CellKind::FulfilledPromise,
            CellState::RejectedPromise(_) => CellKind::RejectedPromise,
        }
    }

    /// Releases resources held by an evicted cell.
    ///
    /// Captured handles are deleted after `grace` so readers that already
    /// opened them can finish. A cell still capturing or pending is marked and
    /// releases its handle once it settles.
    pub(crate) fn release(&self, grace: Duration, runtime: &RuntimeHandle) {
        // The mark is set under the read lock so a settling transition either
        // sees it or has already happened.
        let state = self.read_state();
        match &*state {
            CellState::Stream(captured) => {
                delete_after(grace, runtime, &captured.backing, &captured.handle)
            }
            CellState::FulfilledPromise(inner) => inner.release(grace, runtime),
            CellState::Capturing(_) | CellState::PendingPromise(_) => {
                let _ = self.released.set(Release {
                    grace,
                    runtime: runtime.clone(),
                });
            }
            _ => {}
        }
    }

    // == Transitions ==

    fn finish_capture(&self, captured: Captured) {
        let mut state = self.write_state();
        let CellState::Capturing(capturing) = &*state else {
            warn!("Capture settled for a cell that is no longer capturing");
            return;
        };
        let meta = Arc::clone(&capturing.meta);
        let backing = Arc::clone(&capturing.backing);

        *state = match captured {
            Captured::Stored { handle, bytes } => {
                debug!("Cell now replays {} captured bytes from {}", bytes, handle);
                if let Some(release) = self.released.get() {
                    delete_after(release.grace, &release.runtime, &backing, &handle);
                }
                CellState::Stream(CapturedStream {
                    handle,
                    meta,
                    backing,
                })
            }
            Captured::Failed(error) => CellState::ErrorStream(FailedStream { error, meta }),
        };
    }

    fn settle(&self, settlement: Settlement<T, E>) {
        let mut state = self.write_state();
        if !matches!(&*state, CellState::PendingPromise(_)) {
            warn!("Settlement arrived for a cell that is no longer pending");
            return;
        }

        *state = match settlement {
            Settlement::Fulfilled(inner) => {
                if let Some(release) = self.released.get() {
                    inner.release(release.grace, &release.runtime);
                }
                CellState::FulfilledPromise(inner)
            }
            Settlement::Rejected(err) => CellState::RejectedPromise(err),
        };
    }

    // Transitions never leave a half-written state, so a poisoned lock still
    // holds a coherent value.
    fn read_state(&self) -> RwLockReadGuard<'_, CellState<T, E>> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CellState<T, E>> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Deletes `handle` once `grace` has passed.
fn delete_after(
    grace: Duration,
    runtime: &RuntimeHandle,
    backing: &Arc<dyn BackingStore>,
    handle: &Handle,
) {
    let backing = Arc::clone(backing);
    let handle = handle.clone();
    runtime.spawn(async move {
        tokio::time::sleep(grace).await;
        match backing.delete(&handle).await {
            Ok(()) => debug!("Released captured stream {}", handle),
            Err(e) => warn!("Failed to release captured stream {}: {}", handle, e),
        }
    });
}

/// Projects a settled deferred value, flattening nested deferred results.
async fn resolve<T, E>(settlement: Settlement<T, E>) -> Result<Replay<T, E>, ComputationError<E>>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    match settlement {
        Settlement::Fulfilled(inner) => match inner.project()? {
            Replay::Deferred(nested) => nested.await,
            replay => Ok(replay),
        },
        Settlement::Rejected(err) => Err(err),
    }
}

//! Memoizer Module
//!
//! Wraps a function so that repeated calls with the same first argument replay
//! the first result instead of invoking the function again.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle as RuntimeHandle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::cell::{CellKind, MemoContext, MemoryCell};
use super::outcome::{Outcome, Replay};
use super::stats::MemoStats;
use super::store::MemoryStore;
use crate::backing::{BackingStore, TempDirStore};
use crate::config::{MemoConfig, MemoOptions};
use crate::error::{ComputationError, MemoError, Result};
use crate::tasks::{spawn_eviction_task, Sweep};

type MemoFn<K, R, T, E> = Box<dyn Fn(K, R) -> std::result::Result<Outcome<T, E>, E> + Send + Sync>;

// == Memo Inner ==
/// State shared between a memoizer and its eviction task.
struct MemoInner<T, E> {
    store: Mutex<MemoryStore<T, E>>,
    ctx: MemoContext,
    max_age: Option<Duration>,
    release_grace: Duration,
}

impl<T, E> MemoInner<T, E> {
    fn store(&self) -> MutexGuard<'_, MemoryStore<T, E>> {
        // The store is never left mid-update by a panic
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T, E> Sweep for MemoInner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn sweep_expired(&self) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        // Nothing can be older than the process clock allows
        let Some(cutoff) = Instant::now().checked_sub(max_age) else {
            return 0;
        };

        let evicted = self.store().sweep(cutoff);
        for cell in &evicted {
            cell.release(self.release_grace, &self.ctx.runtime);
        }
        evicted.len()
    }
}

// == Memoizer ==
/// A memoized function.
///
/// `K` is the first argument and the source of the cache key (its `Display`
/// form); `R` holds the remaining arguments, which reach the wrapped function
/// but do not take part in the key.
pub struct Memoizer<K, R, T, E> {
    func: MemoFn<K, R, T, E>,
    inner: Arc<MemoInner<T, E>>,
    evictor: Option<JoinHandle<()>>,
    _args: PhantomData<fn(K, R)>,
}

impl<K, R, T, E> Memoizer<K, R, T, E>
where
    K: fmt::Display,
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    // == Constructors ==
    /// Wraps `func` with a private temporary-directory backing store and
    /// eviction tuning from the environment.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F>(func: F, options: MemoOptions) -> Result<Self>
    where
        F: Fn(K, R) -> std::result::Result<Outcome<T, E>, E> + Send + Sync + 'static,
    {
        let backing = Arc::new(TempDirStore::new()?);
        Self::with_backing_store(func, options, MemoConfig::from_env(), backing)
    }

    /// Wraps `func` using an injected backing store.
    ///
    /// Fails with `InvalidArgument` if `config` is unusable or no tokio
    /// runtime is available for background capture.
    pub fn with_backing_store<F>(
        func: F,
        options: MemoOptions,
        config: MemoConfig,
        backing: Arc<dyn BackingStore>,
    ) -> Result<Self>
    where
        F: Fn(K, R) -> std::result::Result<Outcome<T, E>, E> + Send + Sync + 'static,
    {
        config.validate()?;
        let runtime = RuntimeHandle::try_current().map_err(|e| {
            MemoError::InvalidArgument(format!("A tokio runtime is required: {}", e))
        })?;

        let max_age = options.max_age();
        let inner = Arc::new(MemoInner {
            store: Mutex::new(MemoryStore::new()),
            ctx: MemoContext { runtime, backing },
            max_age,
            release_grace: config.release_grace(),
        });

        let evictor = max_age.map(|max_age| {
            debug!("Forgetting cells after {} ms", max_age.as_millis());
            spawn_eviction_task(Arc::downgrade(&inner), config.sweep_interval())
        });

        Ok(Self {
            func: Box::new(func),
            inner,
            evictor,
            _args: PhantomData,
        })
    }

    // == Call ==
    /// Calls the memoized function.
    ///
    /// On the first call for a key the wrapped function runs and its result is
    /// stored; every call, including the first, returns the projection of the
    /// stored cell. An error from the wrapped function is returned as the same
    /// shared value on every call for that key.
    pub fn call_with(&self, first: K, rest: R) -> std::result::Result<Replay<T, E>, ComputationError<E>> {
        let key = first.to_string();
        let slot = self.inner.store().slot(&key);

        let (cell, produced) = slot.get_or_produce(|| self.produce(&key, first, rest));
        {
            let mut store = self.inner.store();
            if produced {
                store.record_miss();
            } else {
                store.record_hit();
            }
        }

        cell.project()
    }

    fn produce(&self, key: &str, first: K, rest: R) -> Arc<MemoryCell<T, E>> {
        debug!("Memo miss for key {:?}, invoking wrapped function", key);
        let created_at = self.inner.max_age.map(|_| Instant::now());

        match (self.func)(first, rest) {
            Ok(outcome) => MemoryCell::classify(outcome, &self.inner.ctx, created_at),
            Err(err) => MemoryCell::failed(err, created_at),
        }
    }

    // == Introspection ==
    /// Returns true if a cell is stored for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.store().cell(key).is_some()
    }

    /// Returns the current state of the cell stored for `key`.
    pub fn cell_kind(&self, key: &str) -> Option<CellKind> {
        let cell = self.inner.store().cell(key)?;
        Some(cell.kind())
    }

    pub fn len(&self) -> usize {
        self.inner.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemoStats {
        self.inner.store().stats()
    }

    /// Maximum cell age, or None when cells are never forgotten.
    pub fn max_age(&self) -> Option<Duration> {
        self.inner.max_age
    }

    /// Runs one eviction sweep immediately, returning the number of cells
    /// removed.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }
}

impl<K, T, E> Memoizer<K, (), T, E>
where
    K: fmt::Display,
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Calls a memoized single-argument function.
    pub fn call(&self, first: K) -> std::result::Result<Replay<T, E>, ComputationError<E>> {
        self.call_with(first, ())
    }
}

impl<K, R, T, E> Drop for Memoizer<K, R, T, E> {
    fn drop(&mut self) {
        if let Some(evictor) = self.evictor.take() {
            evictor.abort();
        }
    }
}

impl<K, R, T, E> fmt::Debug for Memoizer<K, R, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("max_age", &self.inner.max_age)
            .field("backing", &self.inner.ctx.backing)
            .finish_non_exhaustive()
    }
}

// == Remember ==
/// Memoizes a single-argument function.
///
/// `options.forget.after` enables time-based eviction. Must be called from
/// within a tokio runtime.
///
/// # Example
/// ```no_run
/// use alzheimer::{remember, MemoOptions, Outcome};
///
/// # async fn demo() -> alzheimer::Result<()> {
/// let double = remember(|n: u32| Ok::<_, ()>(Outcome::Value(n * 2)), MemoOptions::default())?;
/// assert_eq!(double.call(3).unwrap().into_value(), Some(6));
/// # Ok(())
/// # }
/// ```
pub fn remember<K, T, E, F>(func: F, options: MemoOptions) -> Result<Memoizer<K, (), T, E>>
where
    K: fmt::Display,
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    F: Fn(K) -> std::result::Result<Outcome<T, E>, E> + Send + Sync + 'static,
{
    Memoizer::new(move |first, ()| func(first), options)
}

/// Memoizes a function taking extra arguments that are passed through but
/// excluded from the cache key.
pub fn remember_with<K, R, T, E, F>(func: F, options: MemoOptions) -> Result<Memoizer<K, R, T, E>>
where
    K: fmt::Display,
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    F: Fn(K, R) -> std::result::Result<Outcome<T, E>, E> + Send + Sync + 'static,
{
    Memoizer::new(func, options)
}

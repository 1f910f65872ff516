//! Memory Store Module
//!
//! Maps cache keys to memory cells. Each key owns a slot that is filled at
//! most once, so the wrapped function runs at most once per key while the
//! key is stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, ThreadId};

use tokio::time::Instant;

use super::cell::MemoryCell;
use super::stats::MemoStats;

// == Slot ==
/// Holds the cell for one key once it has been produced.
pub(crate) struct Slot<T, E> {
    cell: OnceLock<Arc<MemoryCell<T, E>>>,
    /// Thread currently running `produce` for this slot
    producer: Mutex<Option<ThreadId>>,
}

impl<T, E> Slot<T, E> {
    fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            producer: Mutex::new(None),
        }
    }

    /// Returns the slot's cell, running `produce` if it is empty.
    ///
    /// Concurrent callers wait for the first producer. A call made by the
    /// producer itself, from inside `produce`, runs its own `produce` and gets
    /// an uncached cell; the outer call still fills the slot. The flag is true
    /// for every caller whose `produce` ran.
    pub(crate) fn get_or_produce<F>(&self, produce: F) -> (Arc<MemoryCell<T, E>>, bool)
    where
        F: FnOnce() -> Arc<MemoryCell<T, E>>,
    {
        if let Some(cell) = self.cell.get() {
            return (Arc::clone(cell), false);
        }

        let current = thread::current().id();
        if *self.producer() == Some(current) {
            return (produce(), true);
        }

        let mut produced = false;
        let cell = self.cell.get_or_init(|| {
            produced = true;
            let _producing = Producing::mark(&self.producer, current);
            produce()
        });
        (Arc::clone(cell), produced)
    }

    fn producer(&self) -> MutexGuard<'_, Option<ThreadId>> {
        lock_producer(&self.producer)
    }

    fn get(&self) -> Option<&Arc<MemoryCell<T, E>>> {
        self.cell.get()
    }
}

fn lock_producer(producer: &Mutex<Option<ThreadId>>) -> MutexGuard<'_, Option<ThreadId>> {
    producer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a slot as being produced by one thread until dropped, so a panicking
/// `produce` does not leave the mark behind.
struct Producing<'a> {
    producer: &'a Mutex<Option<ThreadId>>,
}

impl<'a> Producing<'a> {
    fn mark(producer: &'a Mutex<Option<ThreadId>>, thread: ThreadId) -> Self {
        *lock_producer(producer) = Some(thread);
        Self { producer }
    }
}

impl Drop for Producing<'_> {
    fn drop(&mut self) {
        *lock_producer(self.producer) = None;
    }
}

// == Memory Store ==
pub(crate) struct MemoryStore<T, E> {
    slots: HashMap<String, Arc<Slot<T, E>>>,
    stats: MemoStats,
}

impl<T, E> MemoryStore<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            stats: MemoStats::new(),
        }
    }

    // == Slot ==
    /// Returns the slot for `key`, inserting an empty one on first use.
    pub(crate) fn slot(&mut self, key: &str) -> Arc<Slot<T, E>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(Slot::new());
        self.slots.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    /// Returns the produced cell for `key`, if any.
    pub(crate) fn cell(&self, key: &str) -> Option<Arc<MemoryCell<T, E>>> {
        self.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    // == Sweep ==
    /// Removes every produced cell created at or before `cutoff` and returns
    /// them for release. Cells without a creation time and slots still being
    /// produced are kept.
    pub(crate) fn sweep(&mut self, cutoff: Instant) -> Vec<Arc<MemoryCell<T, E>>> {
        let expired: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| {
                slot.get()
                    .and_then(|cell| cell.created_at())
                    .is_some_and(|created_at| created_at <= cutoff)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let evicted: Vec<_> = expired
            .iter()
            .filter_map(|key| self.slots.remove(key))
            .filter_map(|slot| slot.get().cloned())
            .collect();

        self.stats.record_evictions(evicted.len());
        evicted
    }

    pub(crate) fn record_hit(&mut self) {
        self.stats.record_hit();
    }

    pub(crate) fn record_miss(&mut self) {
        self.stats.record_miss();
    }

    pub(crate) fn stats(&self) -> MemoStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.len());
        stats
    }

    /// Number of produced cells.
    pub(crate) fn len(&self) -> usize {
        self.slots.values().filter(|slot| slot.get().is_some()).count()
    }
}

//! TTL Eviction Task
//!
//! Background task that periodically removes memory cells older than the
//! configured maximum age.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something the eviction task can sweep.
pub trait Sweep: Send + Sync + 'static {
    /// Removes expired entries and returns how many were removed.
    fn sweep_expired(&self) -> usize;
}

/// Spawns a background task that periodically sweeps `target`.
///
/// The sweep interval is fixed and independent of the maximum age. The task
/// holds only a weak reference and stops on its own once the target is
/// dropped; it can also be aborted through the returned handle.
///
/// Must be called from within a tokio runtime.
///
/// # Example
/// ```ignore
/// let handle = spawn_eviction_task(Arc::downgrade(&memo), Duration::from_secs(1));
/// // Later, when the memoizer goes away:
/// handle.abort();
/// ```
pub fn spawn_eviction_task<S: Sweep>(target: Weak<S>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL eviction task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(target) = target.upgrade() else {
                debug!("TTL eviction: memoizer dropped, stopping");
                break;
            };
            let removed = target.sweep_expired();

            if removed > 0 {
                info!("TTL eviction: removed {} expired cells", removed);
            } else {
                debug!("TTL eviction: no expired cells found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingSweep {
        sweeps: AtomicUsize,
    }

    impl Sweep for CountingSweep {
        fn sweep_expired(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            1
        }
    }

    #[tokio::test]
    async fn test_eviction_task_sweeps_periodically() {
        let target = Arc::new(CountingSweep::default());

        let handle = spawn_eviction_task(Arc::downgrade(&target), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(target.sweeps.load(Ordering::SeqCst) >= 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_eviction_task_stops_when_target_dropped() {
        let target = Arc::new(CountingSweep::default());
        let handle = spawn_eviction_task(Arc::downgrade(&target), Duration::from_millis(10));

        drop(target);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should stop without a target");
    }

    #[tokio::test]
    async fn test_eviction_task_can_be_aborted() {
        let target = Arc::new(CountingSweep::default());
        let handle = spawn_eviction_task(Arc::downgrade(&target), Duration::from_secs(1));

        // Abort immediately
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);
    }
}

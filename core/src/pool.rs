//! Bounded task group.
//!
//! A fixed number of slots exist; [`WorkerPool::reserve`] waits for a free
//! one, which is the only backpressure in a sweep. The caller may do
//! sequential work while holding the slot before [`WorkerPool::submit`]
//! hands it to the spawned unit.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::error;

use crate::error::PoolClosed;

/// One unit of capacity, reserved ahead of spawning.
#[derive(Debug)]
pub struct Slot(OwnedSemaphorePermit);

pub struct WorkerPool<T> {
    slots: Arc<Semaphore>,
    tasks: JoinSet<T>,
    capacity: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Waits for a free slot. Holding the returned [`Slot`] counts against
    /// the pool's capacity until it is dropped or handed to [`Self::submit`].
    pub async fn reserve(&self) -> Result<Slot, PoolClosed> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;
        Ok(Slot(permit))
    }

    /// Spawns `unit` on a reserved slot; the slot is released when the unit
    /// finishes, however it finishes.
    pub fn submit<F>(&mut self, slot: Slot, unit: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.tasks.spawn(async move {
            let _slot = slot;
            unit.await
        });
    }

    /// Collects the outputs of units that already finished, without waiting.
    pub fn reap(&mut self) -> Vec<T> {
        let mut done = Vec::new();
        while let Some(joined) = self.tasks.try_join_next() {
            if let Some(output) = unwrap_joined(joined) {
                done.push(output);
            }
        }
        done
    }

    /// Waits for every submitted unit and returns the outputs not yet reaped.
    pub async fn drain(&mut self) -> Vec<T> {
        let mut done = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            if let Some(output) = unwrap_joined(joined) {
                done.push(output);
            }
        }
        done
    }
}

fn unwrap_joined<T>(joined: Result<T, JoinError>) -> Option<T> {
    match joined {
        Ok(output) => Some(output),
        Err(e) => {
            error!("worker task failed: {e}");
            None
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let mut pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..20usize {
            let running = running.clone();
            let peak = peak.clone();
            let slot = pool.reserve().await.unwrap();
            pool.submit(slot, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            });
            assert!(pool.in_flight() <= pool.capacity());
        }

        let mut outputs = pool.reap();
        outputs.extend(pool.drain().await);
        outputs.sort();

        assert_eq!(outputs, (0..20).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn reserve_blocks_while_saturated() {
        let mut pool = WorkerPool::new(1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let slot = pool.reserve().await.unwrap();
        pool.submit(slot, async move {
            let _ = release_rx.await;
        });

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.reserve()).await;
        assert!(blocked.is_err(), "second reserve should wait for the slot");

        release_tx.send(()).unwrap();
        let slot = pool.reserve().await.unwrap();
        pool.submit(slot, async {});
        assert_eq!(pool.drain().await.len(), 2);
    }

    #[tokio::test]
    async fn dropped_slot_is_returned() {
        let pool: WorkerPool<()> = WorkerPool::new(1);
        let slot = pool.reserve().await.unwrap();
        assert_eq!(pool.in_flight(), 1);
        drop(slot);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_unit_releases_its_slot() {
        let mut pool: WorkerPool<u8> = WorkerPool::new(1);
        let fail = true;
        let slot = pool.reserve().await.unwrap();
        pool.submit(slot, async move {
            if fail {
                panic!("boom");
            }
            0
        });
        let slot = pool.reserve().await.unwrap();
        pool.submit(slot, async { 7 });
        assert_eq!(pool.drain().await, vec![7]);
    }
}

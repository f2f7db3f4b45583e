//! Fixed-capacity worker pool.
//!
//! Each accepted connection waits for a slot before it is processed. Waiters
//! are served in arrival order; the pool bound is the server's only admission
//! control.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::services::metrics;

#[derive(Debug, thiserror::Error)]
#[error("worker pool is closed")]
pub struct PoolClosed;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
    queued: Arc<AtomicUsize>,
}

/// A claimed worker. The slot is released on drop, including during unwind.
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        metrics::worker_released();
    }
}

impl WorkerPool {
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Workers currently holding a connection.
    pub fn busy(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Connections waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Wait for a free worker.
    pub async fn acquire(&self) -> Result<WorkerSlot, PoolClosed> {
        let permit = {
            let _waiting = Waiting::enter(self);
            Arc::clone(&self.slots).acquire_owned().await
        };

        let permit = permit.map_err(|_| PoolClosed)?;
        metrics::worker_acquired();

        Ok(WorkerSlot { _permit: permit })
    }

    /// Stop handing out slots; pending and future `acquire` calls fail.
    /// Slots already held stay valid until dropped.
    pub fn close(&self) {
        self.slots.close();
    }
}

/// Counts a connection as queued for as long as it is alive.
struct Waiting<'a> {
    pool: &'a WorkerPool,
}

impl<'a> Waiting<'a> {
    fn enter(pool: &'a WorkerPool) -> Self {
        pool.queued.fetch_add(1, Ordering::Relaxed);
        metrics::connection_queued();
        Self { pool }
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.pool.queued.fetch_sub(1, Ordering::Relaxed);
        metrics::connection_dequeued();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[tokio::test]
    #[serial(worker_pool)]
    async fn test_acquire_up_to_capacity() {
        let pool = WorkerPool::new(2);
        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();

        assert_eq!(pool.busy(), 2);
        drop(first);
        assert_eq!(pool.busy(), 1);
    }

    #[tokio::test]
    #[serial(worker_pool)]
    async fn test_waiter_queues_until_slot_frees() {
        let pool = WorkerPool::new(1);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.queued(), 1);
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should get the freed slot")
            .unwrap()
            .unwrap();
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    #[serial(worker_pool)]
    async fn test_closed_pool_rejects() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert!(pool.acquire().await.is_err());
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial(worker_pool)]
    async fn test_busy_gauge_balances_under_churn() {
        metrics::init_metrics().unwrap();
        let busy_before = metrics::sample_value("chatbot_workers_busy");
        let queued_before = metrics::sample_value("chatbot_connections_queued");
        let pool = WorkerPool::new(3);

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let _slot = pool.acquire().await.unwrap();
                    tokio::task::yield_now().await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(pool.busy(), 0);
        assert_eq!(metrics::sample_value("chatbot_workers_busy"), busy_before);
        assert_eq!(
            metrics::sample_value("chatbot_connections_queued"),
            queued_before
        );
    }
}

//! Serialized query lane — one exclusive lock shared by live chat handling
//! and background work, plus a FIFO task lane that runs under that lock.
//!
//! Anything that reads or mutates conversational state ("a query") must hold
//! the query lock. Chat handlers take it directly with [`TaskQueue::acquire_lock`];
//! background work goes through [`TaskQueue::enqueue`] and is executed one at a
//! time, in submission order, each task holding the same lock.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, OwnedMutexGuard};
use vigil_core::error::Result;

type BoxedTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send>;

/// FIFO lane state.
struct LaneState {
    pending: VecDeque<(u64, BoxedTask)>,
    processing: bool,
    next_id: u64,
}

struct QueueInner {
    /// tokio's mutex hands the lock to waiters in FIFO order.
    query_lock: Arc<tokio::sync::Mutex<()>>,
    locked: AtomicBool,
    lane: Mutex<LaneState>,
    idle: Notify,
}

/// Shared handle to the query lane. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

/// Exclusive ownership of the query lock.
///
/// Released by [`QueryLock::release`] or on drop, whichever comes first.
pub struct QueryLock {
    guard: Option<OwnedMutexGuard<()>>,
    inner: Arc<QueueInner>,
}

impl QueryLock {
    /// Release the lock and wake the next waiter. Further calls do nothing.
    pub fn release(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.inner.locked.store(false, Ordering::SeqCst);
            drop(guard);
            tracing::trace!("🔓 Query lock released");
        }
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for QueryLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                query_lock: Arc::new(tokio::sync::Mutex::new(())),
                locked: AtomicBool::new(false),
                lane: Mutex::new(LaneState {
                    pending: VecDeque::new(),
                    processing: false,
                    next_id: 0,
                }),
                idle: Notify::new(),
            }),
        }
    }

    fn lane(&self) -> MutexGuard<'_, LaneState> {
        self.inner.lane.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until the query lock is free, then take it.
    pub async fn acquire_lock(&self) -> QueryLock {
        let guard = self.inner.query_lock.clone().lock_owned().await;
        self.inner.locked.store(true, Ordering::SeqCst);
        tracing::trace!("🔒 Query lock acquired");
        QueryLock {
            guard: Some(guard),
            inner: self.inner.clone(),
        }
    }

    /// Append a task to the lane. Returns the task's sequence number.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<F, Fut>(&self, task: F) -> u64
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedTask = Box::new(move || Box::pin(task()));
        let (id, start_driver, queued) = {
            let mut lane = self.lane();
            lane.next_id += 1;
            let id = lane.next_id;
            lane.pending.push_back((id, boxed));
            let start = !lane.processing;
            if start {
                lane.processing = true;
            }
            (id, start, lane.pending.len())
        };

        tracing::debug!("📥 Queue enqueue: task #{} (pending: {})", id, queued);

        if start_driver {
            let queue = self.clone();
            tokio::spawn(async move { queue.process().await });
        }
        id
    }

    /// Drive the lane until it is empty.
    async fn process(self) {
        loop {
            let next = {
                let mut lane = self.lane();
                match lane.pending.pop_front() {
                    Some(task) => task,
                    None => {
                        lane.processing = false;
                        break;
                    }
                }
            };
            let (id, task) = next;

            let mut lock = self.acquire_lock().await;
            // Run in its own task so a panic only takes down this unit of work.
            match tokio::spawn(async move { task().await }).await {
                Ok(Ok(())) => tracing::debug!("✅ Queue task #{} done", id),
                Ok(Err(e)) => tracing::warn!("⚠️ Queue task #{} failed: {e}", id),
                Err(e) => tracing::error!("❌ Queue task #{} aborted: {e}", id),
            }
            lock.release();
        }
        self.inner.idle.notify_waiters();
    }

    /// True while a queued task is executing (or about to, between tasks).
    pub fn is_processing(&self) -> bool {
        self.lane().processing
    }

    /// True while anyone holds the query lock.
    pub fn is_query_locked(&self) -> bool {
        self.inner.locked.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting to start.
    pub fn pending_len(&self) -> usize {
        self.lane().pending.len()
    }

    /// Wait until the lane is empty and idle.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_processing() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vigil_core::error::VigilError;

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let queue = TaskQueue::new();
        let mut first = queue.acquire_lock().await;
        assert!(queue.is_query_locked());

        let q = queue.clone();
        let second = tokio::spawn(async move {
            let _lock = q.acquire_lock().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        first.release();
        tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second holder should get the lock")
            .unwrap();
        assert!(!queue.is_query_locked());
    }

    #[tokio::test]
    async fn test_release_twice_is_noop() {
        let queue = TaskQueue::new();
        let mut first = queue.acquire_lock().await;
        first.release();
        first.release();
        assert!(!first.is_held());

        let _second = queue.acquire_lock().await;
        // The double release must not have let a third holder in.
        let third = tokio::time::timeout(Duration::from_millis(30), queue.acquire_lock()).await;
        assert!(third.is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let queue = TaskQueue::new();
        {
            let _lock = queue.acquire_lock().await;
            assert!(queue.is_query_locked());
        }
        assert!(!queue.is_query_locked());
        let again = tokio::time::timeout(Duration::from_millis(30), queue.acquire_lock()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_waiters_served_in_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut holder = queue.acquire_lock().await;

        let mut handles = Vec::new();
        for i in 0..3 {
            let q = queue.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _lock = q.acquire_lock().await;
                order.lock().unwrap().push(i);
            }));
            // Let the waiter register before the next one.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        holder.release();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_enqueue_runs_fifo() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5u64 {
            let order = order.clone();
            queue.enqueue(move || async move {
                // Earlier tasks sleep longer; order must still hold.
                tokio::time::sleep(Duration::from_millis(10 - i * 2)).await;
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        queue.drain().await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(!queue.is_processing());
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_does_not_block_next() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicBool::new(false));

        queue.enqueue(|| async { Err(VigilError::Scheduler("boom".into())) });
        let flag = ran.clone();
        queue.enqueue(move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        queue.drain().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_block_next() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicBool::new(false));

        // Panics while building its future, before any await.
        queue.enqueue(|| -> std::future::Ready<Result<()>> { panic!("bad task") });
        queue.enqueue(|| async { panic!("bad future") });
        let flag = ran.clone();
        queue.enqueue(move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::timeout(Duration::from_secs(1), queue.drain())
            .await
            .expect("lane should drain after a panicking task");
        assert!(ran.load(Ordering::SeqCst));
        assert!(!queue.is_processing());
        assert!(!queue.is_query_locked());
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_queued_work_waits_for_external_lock() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let mut external = queue.acquire_lock().await;

        let flag = ran.clone();
        queue.enqueue(move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.is_processing());
        assert!(!ran.load(Ordering::SeqCst));

        external.release();
        queue.drain().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drain_on_idle_queue_returns() {
        let queue = TaskQueue::new();
        tokio::time::timeout(Duration::from_millis(50), queue.drain())
            .await
            .expect("drain on an empty queue completes immediately");
    }
}

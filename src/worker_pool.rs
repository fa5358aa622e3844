//! Fixed-size worker pool executing `FnOnce()` tasks off a FIFO queue.
//!
//! Grounded on the reactor's own cross-thread dispatch pattern: a channel carries
//! tasks to N long-lived threads; dropping every `Sender` closes the channel, which
//! is the "mark closed, wake everyone" signal the spec describes for shutdown.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// A task submitted to the pool. Must not outlive the pool: a task holding a
/// non-owning handle (e.g. an fd) is expected to re-validate membership before
/// acting on it, per the connection-table cancellation contract.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of background worker threads.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Sender<Task>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `n` worker threads sharing one FIFO task queue.
    pub fn new(n: usize) -> Self {
        let (sender, receiver): (Sender<Task>, Receiver<Task>) = unbounded();
        let handles = (0..n)
            .map(|i| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("rask-worker-{i}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            task();
                        }
                        debug!(worker = i, "worker pool thread exiting");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        WorkerPool { sender, handles }
    }

    /// Appends `task` to the queue, waking one idle worker.
    ///
    /// Returns an error if the pool has already been shut down; this should not
    /// normally happen while the reactor is running.
    pub fn submit(&self, task: Task) -> Result<(), crate::error::RaskError> {
        self.sender
            .send(task)
            .map_err(|_| crate::error::RaskError::WorkerPoolClosed)
    }

    /// Closes the queue and waits for every in-flight task to finish before every
    /// worker thread exits.
    pub fn shutdown(self) {
        drop(self.sender);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Bounded, blocking producer/consumer queue. Used by the async logger, not the
/// reactor's own worker pool; kept as a small reusable primitive since §4.3 of the
/// design names it as part of this module's contract.
pub struct BoundedQueue<T> {
    sender: std::sync::Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue").finish_non_exhaustive()
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a queue that blocks producers once `capacity` items are in flight.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        BoundedQueue {
            sender: std::sync::Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Blocks until there is room, then pushes `item`. Returns an error if the
    /// queue has been closed.
    pub fn push_back(&self, item: T) -> Result<(), crate::error::RaskError> {
        let guard = self.sender.lock().unwrap();
        match guard.as_ref() {
            Some(sender) => sender
                .send(item)
                .map_err(|_| crate::error::RaskError::LogQueueClosed),
            None => Err(crate::error::RaskError::LogQueueClosed),
        }
    }

    /// Blocks until an item is available, or returns `None` once the queue is
    /// closed and drained.
    pub fn pop(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Like [`BoundedQueue::pop`] but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Closes the queue: drops the sender, which disconnects the channel and wakes
    /// every blocked `pop`/`push_back` call. Subsequent `pop` calls drain whatever
    /// was already queued, then return `None`.
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn fifo_per_submitter_preserves_submission_order() {
        let pool = WorkerPool::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            pool.submit(Box::new(move || seen.lock().unwrap().push(i)))
                .unwrap();
        }
        pool.shutdown();
        assert_eq!((0..10).collect::<Vec<_>>(), *seen.lock().unwrap());
    }

    #[test]
    fn shutdown_drains_in_flight_tasks_before_exit() {
        let pool = WorkerPool::new(4);
        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let completed = completed.clone();
            pool.submit(Box::new(move || {
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(50, completed.load(Ordering::SeqCst));
    }

    #[test]
    fn bounded_queue_round_trips() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.push_back(1).unwrap();
        q.push_back(2).unwrap();
        assert_eq!(Some(1), q.pop());
        assert_eq!(Some(2), q.pop());
    }

    #[test]
    fn bounded_queue_close_drains_then_returns_none() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.push_back(1).unwrap();
        q.close();
        assert!(q.push_back(2).is_err());
        assert_eq!(Some(1), q.pop());
        assert_eq!(None, q.pop());
    }
}

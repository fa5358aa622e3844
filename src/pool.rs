//! Generic bounded resource pool: a mutex-guarded queue plus a condvar standing in
//! for the source's counting semaphore.
//!
//! Grounded on `SqlConnPool` (mutex + queue + `sem_t`): `acquire` blocks while the
//! queue is empty and the pool is open, `release` returns a connection and wakes one
//! waiter. Closing the pool drains it and wakes every blocked acquirer so they
//! observe `None` instead of hanging forever.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    available: Condvar,
    closed: std::sync::atomic::AtomicBool,
}

/// A bounded pool of reusable resources (e.g. SQL connections).
#[derive(Clone)]
pub struct ConnPool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> std::fmt::Debug for ConnPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnPool")
            .field("free", &self.free_count())
            .finish_non_exhaustive()
    }
}

impl<T> ConnPool<T> {
    /// Builds a pool pre-populated with `conns`. The pool's capacity is fixed at
    /// `conns.len()`.
    pub fn new(conns: Vec<T>) -> Self {
        ConnPool {
            inner: Arc::new(Inner {
                queue: Mutex::new(conns.into()),
                available: Condvar::new(),
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Blocks until a connection is available, returning a guard that releases it
    /// back to the pool on drop. Returns `None` if the pool is closed and empty.
    pub fn acquire(&self) -> Option<PooledConn<T>> {
        let mut guard = self.inner.queue.lock().unwrap();
        loop {
            if let Some(conn) = guard.pop_front() {
                return Some(PooledConn {
                    pool: self.inner.clone(),
                    conn: Some(conn),
                });
            }
            if self.inner.closed.load(std::sync::atomic::Ordering::SeqCst) {
                return None;
            }
            guard = self.inner.available.wait(guard).unwrap();
        }
    }

    /// Number of connections currently checked in.
    pub fn free_count(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    /// Marks the pool closed and wakes every blocked `acquire` call; already
    /// checked-out connections are returned normally by their guards, after which
    /// they simply sit unused in the queue.
    pub fn close(&self) {
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.available.notify_all();
    }
}

impl<T> Inner<T> {
    fn release(&self, conn: T) {
        self.queue.lock().unwrap().push_back(conn);
        self.available.notify_one();
    }
}

/// RAII handle to a checked-out connection; releases it back to the pool when
/// dropped, guaranteeing release on every exit path (including early returns via
/// `?`).
pub struct PooledConn<T> {
    pool: Arc<Inner<T>>,
    conn: Option<T>,
}

impl<T> std::fmt::Debug for PooledConn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn").finish_non_exhaustive()
    }
}

impl<T> Deref for PooledConn<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.conn.as_ref().expect("conn taken before drop")
    }
}

impl<T> DerefMut for PooledConn<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("conn taken before drop")
    }
}

impl<T> Drop for PooledConn<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_drop_returns_connection_to_pool() {
        let pool = ConnPool::new(vec![1, 2]);
        assert_eq!(2, pool.free_count());
        {
            let _c = pool.acquire().unwrap();
            assert_eq!(1, pool.free_count());
        }
        assert_eq!(2, pool.free_count());
    }

    #[test]
    fn acquire_blocks_until_release() {
        let pool = ConnPool::new(vec![1]);
        let first = pool.acquire().unwrap();
        let pool2 = pool.clone();
        let handle = std::thread::spawn(move || {
            let conn = pool2.acquire().unwrap();
            *conn
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(first);
        assert_eq!(1, handle.join().unwrap());
    }

    #[test]
    fn close_wakes_blocked_acquirers_with_none() {
        let pool: ConnPool<i32> = ConnPool::new(vec![]);
        let pool2 = pool.clone();
        let handle = std::thread::spawn(move || pool2.acquire());
        std::thread::sleep(std::time::Duration::from_millis(20));
        pool.close();
        assert!(handle.join().unwrap().is_none());
    }
}

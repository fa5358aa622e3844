//! Indexed min-heap of `(id, deadline, callback)`, keyed on monotonic deadline.
//!
//! Every swap updates the `id -> index` side table so that `ref_[heap[i].id] == i`
//! holds at every quiescent point; this lets `adjust`/`do_work` locate a node by id
//! in O(1) before re-sifting in O(log n).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{RaskError, Result};

type Callback = Box<dyn FnOnce() + Send>;

struct TimerNode {
    id: i32,
    deadline: Instant,
    cb: Option<Callback>,
}

/// An indexed min-heap of timers, ordered by ascending deadline.
pub struct TimerHeap {
    heap: Vec<TimerNode>,
    ref_: HashMap<i32, usize>,
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHeap").field("len", &self.heap.len()).finish()
    }
}

impl TimerHeap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        TimerHeap {
            heap: Vec::with_capacity(64),
            ref_: HashMap::new(),
        }
    }

    /// Number of timers currently tracked.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if no timers are tracked.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.ref_.insert(self.heap[i].id, i);
        self.ref_.insert(self.heap[j].id, j);
    }

    /// Moves the node at `i` up until the heap property holds; returns the final
    /// index.
    fn sift_up(&mut self, mut i: usize) -> usize {
        loop {
            if i == 0 {
                break;
            }
            let parent = (i - 1) / 2;
            if self.heap[parent].deadline <= self.heap[i].deadline {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
        i
    }

    /// Moves the node at `index` down (within the first `n` elements) until the
    /// heap property holds. Returns whether any movement occurred.
    fn sift_down(&mut self, index: usize, n: usize) -> bool {
        let mut i = index;
        let mut j = 2 * i + 1;
        while j < n {
            if j + 1 < n && self.heap[j + 1].deadline < self.heap[j].deadline {
                j += 1;
            }
            if self.heap[i].deadline <= self.heap[j].deadline {
                break;
            }
            self.swap(i, j);
            i = j;
            j = 2 * i + 1;
        }
        i > index
    }

    /// Adds a new timer, or reschedules an existing one with the same id.
    pub fn add(&mut self, id: i32, timeout_ms: u64, cb: Callback) {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        match self.ref_.get(&id).copied() {
            None => {
                let i = self.heap.len();
                self.heap.push(TimerNode {
                    id,
                    deadline,
                    cb: Some(cb),
                });
                self.ref_.insert(id, i);
                self.sift_up(i);
            }
            Some(i) => {
                self.heap[i].deadline = deadline;
                self.heap[i].cb = Some(cb);
                let n = self.heap.len();
                if !self.sift_down(i, n) {
                    self.sift_up(i);
                }
            }
        }
    }

    /// Extends an existing timer's deadline. Fails with [`RaskError::UnknownTimerId`]
    /// if `id` isn't tracked.
    pub fn adjust(&mut self, id: i32, timeout_ms: u64) -> Result<()> {
        let i = *self.ref_.get(&id).ok_or(RaskError::UnknownTimerId)?;
        self.heap[i].deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let n = self.heap.len();
        self.sift_down(i, n);
        Ok(())
    }

    /// Removes `id` without invoking its callback. No-op if absent. Used when a
    /// connection closes for a reason other than its own idle timer firing.
    pub fn cancel(&mut self, id: i32) {
        if let Some(&i) = self.ref_.get(&id) {
            self.heap[i].cb = None;
            self.del(i);
        }
    }

    /// Invokes `id`'s callback immediately, then deletes it. No-op if absent.
    pub fn do_work(&mut self, id: i32) {
        if let Some(&i) = self.ref_.get(&id) {
            if let Some(cb) = self.heap[i].cb.take() {
                cb();
            }
            self.del(i);
        }
    }

    /// Removes the node at heap index `index`.
    pub fn del(&mut self, index: usize) {
        let last = self.heap.len() - 1;
        if index != last {
            self.swap(index, last);
        }
        let removed = self.heap.pop().expect("del called on empty heap");
        self.ref_.remove(&removed.id);

        if index < self.heap.len() {
            let n = self.heap.len();
            if !self.sift_down(index, n) {
                self.sift_up(index);
            }
        }
    }

    /// Removes the root (earliest-deadline) node. Equivalent to `del(0)`.
    pub fn pop(&mut self) {
        self.del(0);
    }

    /// Invokes and removes every node whose deadline has passed, stopping at the
    /// first future deadline.
    pub fn tick(&mut self) {
        let now = Instant::now();
        while let Some(node) = self.heap.first() {
            if node.deadline > now {
                break;
            }
            if let Some(cb) = self.heap[0].cb.take() {
                cb();
            }
            self.pop();
        }
    }

    /// Ticks, then returns the new root's remaining milliseconds (clamped to 0), or
    /// `-1` if the heap is empty.
    pub fn get_next_tick(&mut self) -> i64 {
        self.tick();
        match self.heap.first() {
            None => -1,
            Some(node) => {
                let now = Instant::now();
                if node.deadline <= now {
                    0
                } else {
                    (node.deadline - now).as_millis() as i64
                }
            }
        }
    }

    #[cfg(test)]
    fn assert_heap_invariant(&self) {
        for (i, node) in self.heap.iter().enumerate() {
            assert_eq!(self.ref_[&node.id], i);
            for child in [2 * i + 1, 2 * i + 2] {
                if child < self.heap.len() {
                    assert!(node.deadline <= self.heap[child].deadline);
                }
            }
        }
    }
}

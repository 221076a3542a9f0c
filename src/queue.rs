//! Bounded blocking queue — the crate's only multi-thread hand-off
//! primitive.
//!
//! One mutex guards a deque; two condition variables separate producer
//! (not-full) and consumer (not-empty) waits. Used for work dispatch to the
//! worker pool and for asynchronous log delivery.
//!
//! Closing the queue releases every blocked waiter: producers see their
//! push rejected, consumers come back empty-handed. Callers treat that as
//! "abandon the current operation", not as a fatal error.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BlockingQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Append at the back, blocking while the queue is full. Returns
    /// `false` if the queue is (or becomes) closed.
    pub fn push_back(&self, item: T) -> bool {
        let mut inner = self.lock();
        while inner.items.len() >= self.capacity && !inner.closed {
            inner = self.wait_not_full(inner);
        }
        if inner.closed {
            return false;
        }
        inner.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Insert at the front so the item is served ahead of earlier
    /// `push_back`s. Blocks and fails like `push_back`.
    pub fn push_front(&self, item: T) -> bool {
        let mut inner = self.lock();
        while inner.items.len() >= self.capacity && !inner.closed {
            inner = self.wait_not_full(inner);
        }
        if inner.closed {
            return false;
        }
        inner.items.push_front(item);
        self.not_empty.notify_one();
        true
    }

    /// Remove the front item, blocking while the queue is empty. Returns
    /// `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .not_empty
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like `pop`, but gives up after `timeout`. The wait re-checks the
    /// closed flag on every wakeup, so `close` and `flush` are both
    /// observed promptly.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }
    }

    /// Drain all elements, mark the queue closed for good, and wake every
    /// blocked producer and consumer. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Wake one consumer without adding data; lets a timed `pop_timeout`
    /// waiter re-check state before its deadline.
    pub fn flush(&self) {
        self.not_empty.notify_one();
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().items.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A poisoned lock only means a panicking thread held it; the deque
        // itself is still coherent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_not_full<'a>(&'a self, guard: MutexGuard<'a, Inner<T>>) -> MutexGuard<'a, Inner<T>> {
        self.not_full.wait(guard).unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> BlockingQueue<T> {
    pub fn front(&self) -> Option<T> {
        self.lock().items.front().cloned()
    }

    pub fn back(&self) -> Option<T> {
        self.lock().items.back().cloned()
    }
}

//! Cross-thread task queue.
//!
//! A [`CrossThreadQueue`] is the rendezvous point between a thread that owns
//! some execution context (the primary thread, the script thread) and every
//! other thread that needs work done inside that context.
//!
//! ```text
//!   any thread ──enqueue──►  ┌──────────────────────┐
//!   any thread ──enqueue──►  │ VecDeque<T> + signal │ ──drain_all──► owning thread
//!   any thread ──wake─────►  └──────────────────────┘
//! ```
//!
//! # Contract
//!
//! - `enqueue` appends and signals the owner; callable from any thread.
//! - `drain_all` is called only by the owner and removes every task queued
//!   at that instant, in FIFO order. Tasks enqueued afterwards wait for the
//!   next drain.
//! - `wait` blocks the owner until signalled or the timeout elapses. The
//!   signal is auto-reset: one wait consumes it.
//!
//! Running a drained task that synchronously calls `drain_all` on the same
//! queue re-enters the owner's loop. The queue does not prevent this; callers
//! must not do it.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Deferred unit of work executed on the primary thread.
pub type MainTask = Box<dyn FnOnce() + Send + 'static>;

/// Queue of [`MainTask`]s owned by the primary dispatcher.
pub type MainQueue = CrossThreadQueue<MainTask>;

#[derive(Debug)]
struct Inner<T> {
    tasks: VecDeque<T>,
    signaled: bool,
}

/// Thread-safe FIFO of deferred work plus an auto-reset wake signal.
#[derive(Debug)]
pub struct CrossThreadQueue<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

impl<T> CrossThreadQueue<T> {
    /// Creates an empty, unsignalled queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: VecDeque::new(),
                signaled: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Appends a task and wakes the owning thread.
    pub fn enqueue(&self, task: T) {
        let mut inner = self.inner.lock();
        inner.tasks.push_back(task);
        inner.signaled = true;
        drop(inner);
        self.cond.notify_one();
    }

    /// Wakes the owning thread without queueing work.
    pub fn wake(&self) {
        let mut inner = self.inner.lock();
        inner.signaled = true;
        drop(inner);
        self.cond.notify_one();
    }

    /// Removes and returns every queued task in FIFO order.
    #[must_use]
    pub fn drain_all(&self) -> VecDeque<T> {
        std::mem::take(&mut self.inner.lock().tasks)
    }

    /// Blocks until signalled or until `timeout` elapses.
    ///
    /// Returns `true` if the wake signal was consumed, `false` on timeout.
    /// Pending tasks count as a signal, so work enqueued before the call
    /// never sleeps through the timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        if !inner.signaled && inner.tasks.is_empty() {
            // Spurious wakeups fall through; the caller loops anyway.
            let _ = self.cond.wait_for(&mut inner, timeout);
        }
        let woken = inner.signaled || !inner.tasks.is_empty();
        inner.signaled = false;
        woken
    }

    /// Number of tasks currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }
}

impl<T> Default for CrossThreadQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

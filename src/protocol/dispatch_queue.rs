//! # Main-Thread Dispatch Queue
//!
//! Hands work from I/O tasks to the single consumer thread.
//!
//! Any thread may [`enqueue`](DispatchQueue::enqueue); the consumer calls
//! [`drain_and_run_all`](DispatchQueue::drain_and_run_all) once per tick. The
//! lock is held only to push one action or to swap the whole batch out, never
//! while actions run, so I/O tasks are never blocked behind handler code.
//! Actions enqueued while a batch runs land in the next batch.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A deferred zero-argument action.
pub type PendingAction = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Default)]
pub struct DispatchQueue {
    pending: Arc<Mutex<Vec<PendingAction>>>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().push(Box::new(action));
    }

    /// Number of actions waiting for the next drain
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run every queued action in enqueue order and return how many ran.
    pub fn drain_and_run_all(&self) -> usize {
        let batch = mem::take(&mut *self.lock());
        let count = batch.len();
        for action in batch {
            action();
        }
        count
    }

    /// Drop everything queued without running it.
    pub fn clear(&self) -> usize {
        let batch = mem::take(&mut *self.lock());
        batch.len()
    }

    // A panicking action never runs under the lock, so a poisoned mutex still
    // holds a consistent Vec.
    fn lock(&self) -> MutexGuard<'_, Vec<PendingAction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("pending", &self.len())
            .finish()
    }
}

//! Global indexing-status aggregation
//!
//! A single atomic counter tracks how many group-level tasks are live. Only
//! the edges publish events: the 0 to 1 transition announces "indexing
//! started", the last decrement back to 0 announces "indexing stopped", and
//! everything in between stays quiet so subscribers see one clean binary
//! signal instead of a flood.

use crate::events::{EventBus, IndexEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CounterInner {
    count: AtomicUsize,
    events: EventBus,
}

/// Shared counter of live group-level tasks. Cloning shares the counter.
#[derive(Clone)]
pub struct ActiveTaskCounter {
    inner: Arc<CounterInner>,
}

impl ActiveTaskCounter {
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: Arc::new(CounterInner {
                count: AtomicUsize::new(0),
                events,
            }),
        }
    }

    /// Register a task as active. The returned guard deregisters on drop.
    pub fn begin(&self) -> ActivityGuard {
        if self.inner.count.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner
                .events
                .publish(IndexEvent::StatusChanged { indexing: true });
        }
        ActivityGuard {
            counter: self.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    fn end(&self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner
                .events
                .publish(IndexEvent::StatusChanged { indexing: false });
        }
    }
}

/// RAII registration of one active task.
pub struct ActivityGuard {
    counter: ActiveTaskCounter,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.counter.end();
    }
}

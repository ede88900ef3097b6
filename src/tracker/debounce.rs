//! Per-path event debouncing
//!
//! Bursts of change events for the same file collapse into at most one
//! execution per minimum interval. Each path keeps a cancellable deferred
//! task: arming replaces the previous timer instead of stacking a new one,
//! so only the most recently arrived task survives a burst. Priority-10
//! administrative tasks bypass the whole mechanism.
//!
//! Timers suspend the deferred task only, never a caller thread.

use crate::tracker::types::{IndexTask, PRIORITY_MANUAL};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Where debounced tasks go once they fire.
pub type DispatchFn = Arc<dyn Fn(IndexTask) + Send + Sync>;

#[derive(Default)]
struct PathState {
    last_executed: Option<Instant>,
    pending: Option<JoinHandle<()>>,
}

struct DebounceInner {
    interval: Duration,
    dispatch: DispatchFn,
    state: StdMutex<HashMap<PathBuf, PathState>>,
}

/// Coalesces per-path task bursts down to the configured rate.
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<DebounceInner>,
}

impl Debouncer {
    pub fn new(interval: Duration, dispatch: DispatchFn) -> Self {
        Self {
            inner: Arc::new(DebounceInner {
                interval,
                dispatch,
                state: StdMutex::new(HashMap::new()),
            }),
        }
    }

    /// Submit a task. Administrative priority executes immediately; anything
    /// else is rate-limited per path with timer replacement.
    pub fn submit(&self, task: IndexTask) {
        if task.priority >= PRIORITY_MANUAL {
            trace!("Priority {} task bypasses debouncing: {}", task.priority, task.path.display());
            (self.inner.dispatch)(task);
            return;
        }

        let path = task.path.clone();
        let now = Instant::now();

        let mut state = self.inner.state.lock().unwrap();
        let entry = state.entry(path.clone()).or_default();

        let wait = match entry.last_executed {
            Some(last) if now.duration_since(last) < self.inner.interval => {
                Some(self.inner.interval - now.duration_since(last))
            }
            _ => None,
        };

        match wait {
            None => {
                entry.last_executed = Some(now);
                drop(state);
                (self.inner.dispatch)(task);
            }
            Some(wait) => {
                // The newest task supersedes whatever was pending.
                if let Some(pending) = entry.pending.take() {
                    pending.abort();
                    debug!("Superseded pending task for {}", path.display());
                }

                let inner = Arc::clone(&self.inner);
                entry.pending = Some(tokio::spawn(async move {
                    tokio::time::sleep(wait).await;

                    {
                        let mut state = inner.state.lock().unwrap();
                        if let Some(entry) = state.get_mut(&path) {
                            entry.last_executed = Some(Instant::now());
                            entry.pending = None;
                        }
                    }
                    (inner.dispatch)(task);
                }));
            }
        }
    }

    /// Number of paths with an armed deferred task.
    pub fn pending_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.pending.is_some())
            .count()
    }
}

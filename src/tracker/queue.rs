//! Bounded task queue and worker pool
//!
//! Producers never block: the queue is a bounded channel fed with `try_send`,
//! and a task that does not fit is dropped with a warning. Dropping releases
//! the task's completion barrier immediately so no caller waits on work that
//! will never run. This is deliberate backpressure, a throughput signal
//! rather than an error condition.

use crate::context::SawmillContext;
use crate::tracker::types::IndexTask;
use crate::tracker::worker;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Producer handle to the bounded index queue.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<IndexTask>,
    capacity: usize,
}

impl TaskQueue {
    /// Create the queue and its consumer end.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<IndexTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue a task. Returns false when the queue was saturated and the
    /// task dropped; its barrier has been released by then.
    pub fn submit(&self, task: IndexTask) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(mut dropped)) => {
                warn!(
                    "Task queue saturated ({} slots), dropping task for {}",
                    self.capacity,
                    dropped.path.display()
                );
                dropped.release_barrier();
                false
            }
            Err(TrySendError::Closed(mut dropped)) => {
                debug!(
                    "Task queue closed, dropping task for {}",
                    dropped.path.display()
                );
                dropped.release_barrier();
                false
            }
        }
    }
}

/// Spawn the worker pool consuming the queue. Workers share the single
/// receiver behind a mutex and exit once the shutdown signal flips or the
/// queue closes.
pub fn spawn_workers(
    ctx: Arc<SawmillContext>,
    rx: mpsc::Receiver<IndexTask>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(TokioMutex::new(rx));
    info!("🔄 Starting {} index workers", count);

    (0..count)
        .map(|worker_id| {
            let ctx = Arc::clone(&ctx);
            let rx = Arc::clone(&rx);
            let mut shutdown = ctx.shutdown.subscribe();

            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            task = rx.recv() => task,
                            _ = shutdown.changed() => None,
                        }
                    };

                    let Some(mut task) = task else {
                        debug!("Index worker {} exiting", worker_id);
                        break;
                    };

                    // A task that observes shutdown before starting declines
                    // to run; one already past this check runs to completion.
                    if ctx.shutdown.is_triggered() {
                        debug!(
                            "Worker {} declining task for {} during shutdown",
                            worker_id,
                            task.path.display()
                        );
                        task.release_barrier();
                        continue;
                    }

                    if let Err(e) = worker::execute(&ctx, &task).await {
                        error!("Index task failed for {}: {}", task.path.display(), e);
                    }
                    task.release_barrier();
                }
            })
        })
        .collect()
}

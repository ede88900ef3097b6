//! Group task scheduling
//!
//! The scheduler launches group-level index tasks with per-group mutual
//! exclusion: one lazily-created lock per canonical path, probed without
//! blocking. Scheduling returns immediately with the task handle; callers
//! that need a barrier await it, everyone else discards it.

pub mod recovery;
pub mod status;

use crate::context::SawmillContext;
use crate::engine::{noop_progress, ProgressFn};
use crate::error::{IndexError, Result};
use crate::store::IndexStatus;
use crate::tracker::worker;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use recovery::RecoveryManager;

#[derive(Clone)]
pub struct TaskScheduler {
    ctx: Arc<SawmillContext>,
}

impl TaskScheduler {
    pub fn new(ctx: Arc<SawmillContext>) -> Self {
        Self { ctx }
    }

    /// Non-blocking probe: try the group lock, release immediately on
    /// success. Failure to acquire means a task is running.
    pub fn is_task_in_progress(&self, canonical: &Path) -> bool {
        let key = canonical.to_string_lossy();
        match self.ctx.group_locks.try_acquire(&key) {
            Some(guard) => {
                drop(guard);
                false
            }
            None => true,
        }
    }

    /// Launch a group index task, failing fast when one is already running
    /// for the same canonical path. The returned handle is the optional
    /// completion barrier.
    pub fn schedule_index_task(
        &self,
        canonical: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<JoinHandle<()>> {
        if self.ctx.shutdown.is_triggered() {
            return Err(IndexError::ShuttingDown);
        }

        let key = canonical.to_string_lossy().into_owned();
        let Some(guard) = self.ctx.group_locks.try_acquire(&key) else {
            debug!("Task already in progress for group {}", canonical.display());
            return Err(IndexError::TaskInProgress(key));
        };

        let ctx = Arc::clone(&self.ctx);
        let canonical = canonical.to_path_buf();
        let progress = progress.unwrap_or_else(noop_progress);

        let task_canonical = canonical.clone();
        let handle = tokio::spawn(async move {
            let canonical = task_canonical;
            let _guard = guard;
            let _activity = ctx.active_tasks.begin();

            if ctx.shutdown.is_triggered() {
                debug!("Declining scheduled task for {} during shutdown", canonical.display());
                return;
            }

            // Failures are recorded as persisted status and picked up by the
            // next recovery pass; there is nobody to propagate them to here.
            if let Err(e) = worker::run_group_index(&ctx, &canonical, progress).await {
                warn!("Scheduled index task failed for {}: {}", canonical.display(), e);
            }
        });

        info!("📋 Scheduled index task for group {}", canonical.display());
        Ok(handle)
    }

    /// Mark a group as queued at the given position before its task starts.
    pub fn mark_queued(&self, canonical: &Path, position: i64) -> Result<()> {
        self.ctx
            .store()
            .update_status(canonical, IndexStatus::Queued, position, None)
    }

    /// Broadcast the shutdown signal and wait, within the configured bound,
    /// for active tasks to observe it and finish. A timeout is logged, never
    /// allowed to hang the process.
    pub async fn shutdown(&self) {
        info!("Shutting down task scheduler");
        self.ctx.shutdown.trigger();

        let timeout = Duration::from_secs(self.ctx.config.shutdown_timeout_secs);
        let ctx = Arc::clone(&self.ctx);
        let drained = tokio::time::timeout(timeout, async move {
            while ctx.active_tasks.active() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => info!("All indexing tasks drained"),
            Err(_) => warn!(
                "Shutdown timed out after {}s with {} tasks still active",
                self.ctx.config.shutdown_timeout_secs,
                self.ctx.active_tasks.active()
            ),
        }
    }
}

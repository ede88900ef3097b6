//! Crash recovery of interrupted index work
//!
//! A group left in `indexing` or `queued` was cut off mid-flight and always
//! needs another pass. A group in `error` is retried only when the failure
//! is recent; older errors are treated as abandoned rather than hammered
//! forever. Recovered groups are queued with sequential positions and
//! started with a small stagger so a restart does not stampede the engine.

use crate::context::SawmillContext;
use crate::error::{IndexError, Result};
use crate::scheduler::TaskScheduler;
use crate::store::{unix_now, IndexStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RecoveryManager {
    ctx: Arc<SawmillContext>,
    scheduler: TaskScheduler,
    // Attempts per group within this process lifetime. The persisted status
    // machine has no retry column, so the ceiling resets on restart; the
    // one-hour error window is the guard across restarts.
    attempts: StdMutex<HashMap<PathBuf, u32>>,
}

impl RecoveryManager {
    pub fn new(ctx: Arc<SawmillContext>, scheduler: TaskScheduler) -> Self {
        Self {
            ctx,
            scheduler,
            attempts: StdMutex::new(HashMap::new()),
        }
    }

    /// Wait out the startup grace period, then recover interrupted groups.
    pub async fn run_after_grace(&self) -> Result<usize> {
        let grace = Duration::from_millis(self.ctx.config.recovery_grace_ms);
        debug!("Recovery waiting {}ms grace period", grace.as_millis());
        tokio::time::sleep(grace).await;
        self.run().await
    }

    /// Classify every known group and reschedule the ones left mid-flight.
    /// Idempotent: a second pass with no state change schedules nothing,
    /// because affected groups are already queued or indexing and the
    /// scheduler's probe rejects duplicates.
    pub async fn run(&self) -> Result<usize> {
        if self.ctx.shutdown.is_triggered() {
            return Err(IndexError::ShuttingDown);
        }

        let records = self.ctx.store().all_records()?;

        // Group status lives on the canonical record (path == group_key).
        let mut candidates: Vec<PathBuf> = Vec::new();
        for record in &records {
            if record.path != record.group_key {
                continue;
            }
            if self.needs_recovery(record.status, record.last_indexed) {
                candidates.push(record.group_key.clone());
            }
        }
        candidates.sort();

        if candidates.is_empty() {
            info!("Recovery pass found nothing to do");
            return Ok(0);
        }

        info!("🔁 Recovery pass found {} interrupted groups", candidates.len());
        let stagger = Duration::from_millis(self.ctx.config.recovery_stagger_ms);
        let mut scheduled = 0;

        for (position, group) in candidates.iter().enumerate() {
            if self.ctx.shutdown.is_triggered() {
                break;
            }

            if self.scheduler.is_task_in_progress(group) {
                debug!("Group {} already has a running task, skipping", group.display());
                continue;
            }

            if !self.admit_attempt(group) {
                warn!(
                    "Group {} exceeded {} recovery attempts, leaving in current state",
                    group.display(),
                    self.ctx.config.max_recovery_attempts
                );
                continue;
            }

            self.scheduler.mark_queued(group, (position + 1) as i64)?;
            match self.scheduler.schedule_index_task(group, None) {
                Ok(_handle) => {
                    scheduled += 1;
                    debug!("Recovered group {} at queue position {}", group.display(), position + 1);
                }
                Err(IndexError::TaskInProgress(_)) => {
                    debug!("Lost the race scheduling {}, task already running", group.display());
                }
                Err(e) => return Err(e),
            }

            if position + 1 < candidates.len() {
                tokio::time::sleep(stagger).await;
            }
        }

        info!("Recovery scheduled {} groups", scheduled);
        Ok(scheduled)
    }

    /// Count one recovery attempt for the group; false once the ceiling is
    /// reached. Attempts are only charged when a task will actually be
    /// scheduled, so a healthy running task never burns the budget.
    fn admit_attempt(&self, group: &PathBuf) -> bool {
        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(group.clone()).or_insert(0);
        if *count >= self.ctx.config.max_recovery_attempts {
            return false;
        }
        *count += 1;
        true
    }

    fn needs_recovery(&self, status: IndexStatus, last_indexed: i64) -> bool {
        match status {
            // Interrupted mid-flight: always recover.
            IndexStatus::Indexing | IndexStatus::Queued => true,
            // Recent errors are treated as transient; old ones as abandoned.
            IndexStatus::Error => {
                let window = self.ctx.config.recovery_error_window_secs as i64;
                unix_now() - last_indexed <= window
            }
            IndexStatus::Indexed | IndexStatus::NotIndexed => false,
        }
    }
}

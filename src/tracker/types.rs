//! Task and tracking types for the indexing pipeline

use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Manual and administrative tasks; never debounced.
pub const PRIORITY_MANUAL: u8 = 10;
/// Change-triggered update of an already-tracked file.
pub const PRIORITY_UPDATE: u8 = 2;
/// First index pass after a path is added.
pub const PRIORITY_INITIAL: u8 = 1;

/// A unit of indexing work, consumed exactly once by a worker.
#[derive(Debug)]
pub struct IndexTask {
    pub id: Uuid,
    /// File path, or the canonical group path for group-level tasks.
    pub path: PathBuf,
    pub group_task: bool,
    pub priority: u8,
    /// Discard prior progress and reindex from scratch.
    pub full: bool,
    /// Released when the task finishes or is dropped, so no caller waits
    /// forever on work that will never run.
    pub barrier: Option<oneshot::Sender<()>>,
}

impl IndexTask {
    fn new(path: PathBuf, priority: u8, group_task: bool, full: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            group_task,
            priority,
            full,
            barrier: None,
        }
    }

    /// First pass over a newly added file.
    pub fn initial(path: PathBuf, full: bool) -> Self {
        Self::new(path, PRIORITY_INITIAL, false, full)
    }

    /// Change-triggered update of a tracked file.
    pub fn update(path: PathBuf) -> Self {
        Self::new(path, PRIORITY_UPDATE, false, false)
    }

    /// Full pass over one file, e.g. a freshly created compressed member.
    pub fn full_file(path: PathBuf) -> Self {
        Self::new(path, PRIORITY_UPDATE, false, true)
    }

    /// Administrative full rebuild of an entire group.
    pub fn manual_group(canonical: PathBuf) -> Self {
        Self::new(canonical, PRIORITY_MANUAL, true, true)
    }

    /// Attach a completion barrier; the returned receiver resolves when the
    /// task finishes or is dropped under queue saturation.
    pub fn with_barrier(mut self) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        self.barrier = Some(tx);
        (self, rx)
    }

    /// Release the completion barrier, if any caller attached one.
    pub fn release_barrier(&mut self) {
        if let Some(barrier) = self.barrier.take() {
            let _ = barrier.send(());
        }
    }
}

/// In-memory tracking metadata for one watched file.
#[derive(Debug, Clone)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub last_modified: SystemTime,
    pub last_size: u64,
    pub last_indexed: Option<SystemTime>,
    pub compressed: bool,
    /// Cached (min, max) Unix timestamps of lines seen in this file.
    pub time_range: Option<(i64, i64)>,
}

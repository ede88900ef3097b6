//! File tracking and indexing pipeline
//!
//! The tracker owns the in-memory table of watched files and the front half
//! of the pipeline: discovery and filesystem events land here, pass through
//! the per-path debouncer, and come out as tasks on the bounded queue that
//! the worker pool consumes.

pub mod debounce;
pub mod queue;
pub mod types;
pub mod worker;

use crate::context::SawmillContext;
use crate::error::Result;
use crate::rotation;
use crate::tracker::debounce::Debouncer;
use crate::tracker::queue::TaskQueue;
use crate::tracker::types::{IndexTask, TrackedFile};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub use types::{PRIORITY_INITIAL, PRIORITY_MANUAL, PRIORITY_UPDATE};
pub use worker::{decide, force_reindex_group, run_group_index, WorkDecision};

/// Tracks every known log file and feeds the indexing pipeline.
pub struct LogTracker {
    ctx: Arc<SawmillContext>,
    files: StdRwLock<HashMap<PathBuf, TrackedFile>>,
    debouncer: Debouncer,
    queue: TaskQueue,
}

impl LogTracker {
    /// Wire the tracker to the queue through a fresh debouncer.
    pub fn new(ctx: Arc<SawmillContext>, queue: TaskQueue) -> Arc<Self> {
        let interval = Duration::from_millis(ctx.config.min_index_interval_ms);
        let dispatch_queue = queue.clone();
        let debouncer = Debouncer::new(
            interval,
            Arc::new(move |task: IndexTask| {
                dispatch_queue.submit(task);
            }),
        );

        Arc::new(Self {
            ctx,
            files: StdRwLock::new(HashMap::new()),
            debouncer,
            queue,
        })
    }

    /// Register a file for tracking and enqueue its first index pass.
    /// Adding an already-tracked path only refreshes its compressed flag.
    pub fn add_path(&self, path: &Path) -> Result<()> {
        self.ctx.validator.validate(path)?;

        let compressed = rotation::is_compressed(path);
        {
            let mut files = self.files.write().unwrap();
            if let Some(existing) = files.get_mut(path) {
                existing.compressed = compressed;
                debug!("Path already tracked: {}", path.display());
                return Ok(());
            }

            let metadata = match std::fs::metadata(path) {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Skipping vanished path: {}", path.display());
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            files.insert(
                path.to_path_buf(),
                TrackedFile {
                    path: path.to_path_buf(),
                    last_modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    last_size: metadata.len(),
                    last_indexed: None,
                    compressed,
                    time_range: None,
                },
            );
        }

        // Whether this becomes incremental or full work is the worker's
        // decision against the persisted record; the initial task just
        // carries the hint for never-seen paths.
        let full = self.ctx.store().get_record(path)?.is_none() && compressed;
        info!("➕ Tracking {}", path.display());
        self.debouncer.submit(IndexTask::initial(path.to_path_buf(), full));
        Ok(())
    }

    /// Walk the directories of the configured logs and register every
    /// rotation member found. Returns the number of tracked files.
    pub fn discover(&self) -> Result<usize> {
        let mut found = 0;

        for log in &self.ctx.config.logs {
            let canonical = rotation::canonical_group_key(log);
            let base_name = match canonical.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let Some(dir) = canonical.parent() else {
                continue;
            };
            if let Err(e) = self.ctx.validator.validate(&canonical) {
                warn!("Configured log rejected by validator: {}", e);
                continue;
            }

            for entry in WalkDir::new(dir).max_depth(1).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!("Discovery skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str() else {
                    continue;
                };
                if !rotation::is_group_member(name, &base_name) {
                    continue;
                }
                match self.add_path(entry.path()) {
                    Ok(()) => found += 1,
                    Err(e) => warn!("Failed to track {}: {}", entry.path().display(), e),
                }
            }
        }

        info!("🔍 Discovery pass complete: {} files tracked", found);
        Ok(found)
    }

    /// Submit a change-triggered task for a tracked path, refreshing the
    /// in-memory metadata on the way through.
    pub fn file_changed(&self, path: &Path) {
        let record = self.ctx.store().get_record(path).ok().flatten();

        if let Ok(metadata) = std::fs::metadata(path) {
            let mut files = self.files.write().unwrap();
            if let Some(tracked) = files.get_mut(path) {
                tracked.last_modified = metadata.modified().unwrap_or(tracked.last_modified);
                tracked.last_size = metadata.len();
                if let Some(record) = record {
                    if record.last_indexed > 0 {
                        tracked.last_indexed = Some(
                            SystemTime::UNIX_EPOCH
                                + Duration::from_secs(record.last_indexed as u64),
                        );
                    }
                    if let (Some(min), Some(max)) = (record.min_timestamp, record.max_timestamp) {
                        tracked.time_range = Some((min, max));
                    }
                }
            }
        }
        self.debouncer.submit(IndexTask::update(path.to_path_buf()));
    }

    /// A compressed member appeared (rotation finished writing it): track it
    /// and index the new file in full.
    pub fn compressed_member_created(&self, path: &Path) {
        if let Err(e) = self.add_path(path) {
            warn!("Failed to track new compressed member {}: {}", path.display(), e);
            return;
        }
        self.debouncer.submit(IndexTask::full_file(path.to_path_buf()));
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path)
    }

    pub fn snapshot(&self, path: &Path) -> Option<TrackedFile> {
        self.files.read().unwrap().get(path).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.files.read().unwrap().len()
    }

    /// Canonical keys of every group with at least one tracked member.
    pub fn known_groups(&self) -> HashSet<PathBuf> {
        self.files
            .read()
            .unwrap()
            .keys()
            .map(|path| rotation::canonical_group_key(path))
            .collect()
    }

    /// Explicit cache clear: the only way tracked entries are ever removed.
    pub fn clear(&self) {
        let mut files = self.files.write().unwrap();
        let count = files.len();
        files.clear();
        info!("Cleared {} tracked files", count);
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }
}

//! Filesystem change integration
//!
//! Notify events are pumped through a channel into the tracker: a write to a
//! tracked file becomes a debounced incremental task, and the appearance of
//! a compressed file matching a known group means a rotation just finished,
//! so that file gets a full pass. Everything else is noise and is dropped
//! here.

use crate::context::SawmillContext;
use crate::error::{IndexError, Result};
use crate::rotation;
use crate::tracker::LogTracker;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Watches the directories of every configured log and feeds the tracker.
pub struct LogWatcher {
    watcher: Option<notify::RecommendedWatcher>,
    ctx: Arc<SawmillContext>,
    tracker: Arc<LogTracker>,
    ignore_patterns: Vec<glob::Pattern>,
}

impl LogWatcher {
    pub fn new(ctx: Arc<SawmillContext>, tracker: Arc<LogTracker>) -> Result<Self> {
        let ignore_patterns = ctx
            .config
            .exclude_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| IndexError::Config(format!("Invalid ignore pattern {p}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            watcher: None,
            ctx,
            tracker,
            ignore_patterns,
        })
    }

    /// Start watching the parent directory of every configured log.
    pub fn start(&mut self) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Failed to forward file event: {}", e);
            }
        })
        .map_err(|e| IndexError::Watch(format!("Failed to create watcher: {e}")))?;

        let mut watched = 0;
        for dir in self.watch_dirs() {
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    watched += 1;
                    debug!("Watching directory {}", dir.display());
                }
                Err(e) => warn!("Failed to watch {}: {}", dir.display(), e),
            }
        }
        self.watcher = Some(watcher);

        let tracker = Arc::clone(&self.tracker);
        let ignore_patterns = self.ignore_patterns.clone();
        let mut shutdown = self.ctx.shutdown.subscribe();

        tokio::spawn(async move {
            info!("🔍 Filesystem event pump started");
            loop {
                let event = tokio::select! {
                    event = rx.recv() => event,
                    _ = shutdown.changed() => break,
                };
                match event {
                    Some(Ok(event)) => process_event(&tracker, &ignore_patterns, event),
                    Some(Err(e)) => warn!("File watcher error: {}", e),
                    None => break,
                }
            }
            debug!("Filesystem event pump exiting");
        });

        info!("File watcher started over {} directories", watched);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("File watcher stopped");
        }
    }

    fn watch_dirs(&self) -> HashSet<PathBuf> {
        self.ctx
            .config
            .logs
            .iter()
            .filter_map(|log| log.parent().map(Path::to_path_buf))
            .collect()
    }
}

fn is_ignored(path: &Path, ignore_patterns: &[glob::Pattern]) -> bool {
    ignore_patterns.iter().any(|p| p.matches_path(path))
}

/// Turn one notify event into tracker submissions.
fn process_event(tracker: &Arc<LogTracker>, ignore_patterns: &[glob::Pattern], event: Event) {
    match event.kind {
        EventKind::Modify(_) => {
            for path in event.paths {
                if is_ignored(&path, ignore_patterns) {
                    continue;
                }
                if tracker.is_tracked(&path) {
                    debug!("Write event for {}", path.display());
                    tracker.file_changed(&path);
                }
            }
        }
        EventKind::Create(_) => {
            for path in event.paths {
                if is_ignored(&path, ignore_patterns) {
                    continue;
                }
                // A fresh .gz landing in a known group means a rotation just
                // finished writing; index the new member in full.
                if rotation::is_compressed(&path) {
                    let canonical = rotation::canonical_group_key(&path);
                    if tracker.known_groups().contains(&canonical) {
                        info!(
                            "📦 New compressed member {} in group {}",
                            path.display(),
                            canonical.display()
                        );
                        tracker.compressed_member_created(&path);
                    }
                }
            }
        }
        _ => {}
    }
}

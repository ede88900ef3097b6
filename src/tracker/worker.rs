//! Index worker execution
//!
//! A worker takes one task, locks its path, compares the persisted record
//! against the current filesystem state, and picks one of three moves:
//! skip (nothing changed), incremental (resume the active file from the
//! recorded offset), or full (rotation or truncation invalidated the offset,
//! so the whole group is reread from scratch).

use crate::context::SawmillContext;
use crate::engine::{noop_progress, ProgressFn, ProgressUpdate};
use crate::error::{IndexError, Result};
use crate::events::IndexEvent;
use crate::rotation;
use crate::store::{unix_now, IndexRecord, IndexStatus};
use crate::tracker::queue::TaskQueue;
use crate::tracker::types::IndexTask;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a worker decided to do with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkDecision {
    /// Persisted state matches the filesystem; nothing to do.
    Skip,
    /// The recorded offset is no longer trustworthy; reread the group.
    FullReindex,
    /// Resume the active file from the recorded offset.
    Incremental { from_offset: u64 },
}

/// Compare persisted state against current filesystem observations.
///
/// A shrinking group weight or a modification time older than the recorded
/// one both signal rotation or truncation, which invalidates the read
/// offset.
pub fn decide(record: Option<&IndexRecord>, current_mtime: i64, current_weight: u64) -> WorkDecision {
    let Some(record) = record else {
        return WorkDecision::Incremental { from_offset: 0 };
    };

    let current_weight = current_weight as i64;
    if current_mtime == record.last_modified && current_weight == record.last_weight {
        WorkDecision::Skip
    } else if current_weight < record.last_weight || current_mtime < record.last_modified {
        WorkDecision::FullReindex
    } else {
        WorkDecision::Incremental {
            from_offset: record.last_position.max(0) as u64,
        }
    }
}

fn unix_mtime(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Execute one task from the queue.
pub async fn execute(ctx: &Arc<SawmillContext>, task: &IndexTask) -> Result<()> {
    if task.group_task {
        execute_group_task(ctx, &task.path).await
    } else {
        execute_file_task(ctx, &task.path, task.full).await
    }
}

/// Group-level task: runs under the group lock and counts toward the global
/// indexing status, exactly like a scheduler-launched task.
async fn execute_group_task(ctx: &Arc<SawmillContext>, canonical: &Path) -> Result<()> {
    let key = canonical.to_string_lossy();
    let _guard = ctx.group_locks.acquire(&key).await;
    let _activity = ctx.active_tasks.begin();

    if ctx.shutdown.is_triggered() {
        debug!("Declining group task for {} during shutdown", canonical.display());
        return Err(IndexError::ShuttingDown);
    }

    run_group_index(ctx, canonical, noop_progress()).await
}

/// File-level task: runs under the per-file lock keyed by the literal path.
async fn execute_file_task(ctx: &Arc<SawmillContext>, path: &Path, force_full: bool) -> Result<()> {
    ctx.validator.validate(path)?;

    let key = path.to_string_lossy();
    let _guard = ctx.file_locks.acquire(&key).await;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // The file vanished between discovery and access; not fatal.
            debug!("File vanished before indexing: {}", path.display());
            return Ok(());
        }
        Err(e) => {
            let err: IndexError = if e.kind() == std::io::ErrorKind::PermissionDenied {
                IndexError::PermissionDenied(path.to_path_buf())
            } else {
                e.into()
            };
            ctx.store()
                .update_status(path, IndexStatus::Error, 0, Some(&err.to_string()))?;
            return Err(err);
        }
    };

    let canonical = rotation::canonical_group_key(path);
    let current_mtime = unix_mtime(&metadata);
    let current_weight = rotation::group_weight(&canonical, &ctx.validator)?;
    let record = ctx.store().get_record(path)?;

    let decision = if force_full {
        WorkDecision::FullReindex
    } else {
        decide(record.as_ref(), current_mtime, current_weight)
    };

    match decision {
        WorkDecision::Skip => {
            debug!("Index state current for {}, skipping", path.display());
            Ok(())
        }
        WorkDecision::FullReindex => {
            info!(
                "📉 Offset invalidated for {} (rotation or truncation), rereading group {}",
                path.display(),
                canonical.display()
            );
            run_group_index(ctx, &canonical, noop_progress()).await
        }
        WorkDecision::Incremental { from_offset } => {
            index_incremental(ctx, path, &canonical, from_offset, current_mtime, current_weight).await
        }
    }
}

/// Resume the active file from its recorded offset and persist the advance.
async fn index_incremental(
    ctx: &Arc<SawmillContext>,
    path: &Path,
    canonical: &Path,
    from_offset: u64,
    current_mtime: i64,
    current_weight: u64,
) -> Result<()> {
    let started = unix_now();
    let clock = Instant::now();

    let outcome = match ctx.engine.index_file(path, from_offset).await {
        Ok(outcome) => outcome,
        Err(e) => {
            ctx.store()
                .update_status(path, IndexStatus::Error, 0, Some(&e.to_string()))?;
            return Err(e);
        }
    };

    let mut record = ctx
        .store()
        .get_record(path)?
        .unwrap_or_else(|| IndexRecord::new(path, canonical));
    record.group_key = canonical.to_path_buf();
    record.last_modified = current_mtime;
    record.last_weight = current_weight as i64;
    // The read offset only means anything for the active file.
    record.last_position = if path == canonical {
        outcome.new_offset as i64
    } else {
        0
    };
    record.last_indexed = unix_now();
    record.index_started = started;
    record.index_duration_ms = clock.elapsed().as_millis() as i64;
    record.doc_count += outcome.docs_added as i64;
    if let Some(min) = outcome.min_timestamp.map(|t| t.timestamp()) {
        record.min_timestamp = Some(record.min_timestamp.map_or(min, |m| m.min(min)));
    }
    if let Some(max) = outcome.max_timestamp.map(|t| t.timestamp()) {
        record.max_timestamp = Some(record.max_timestamp.map_or(max, |m| m.max(max)));
    }
    record.status = IndexStatus::Indexed;
    record.queue_position = 0;
    record.status_message = None;
    ctx.store().save_record(&record)?;

    debug!(
        "Incrementally indexed {} (+{} docs, offset {} -> {})",
        path.display(),
        outcome.docs_added,
        from_offset,
        outcome.new_offset
    );
    Ok(())
}

/// Index an entire group from scratch and persist the outcome. Shared by
/// worker-detected full reindexes, administrative rebuilds, and the
/// scheduler's group tasks.
pub async fn run_group_index(
    ctx: &Arc<SawmillContext>,
    canonical: &Path,
    progress: ProgressFn,
) -> Result<()> {
    ctx.validator.validate(canonical)?;

    // Zero out offsets up front: if this run is interrupted, the next pass
    // must not resume from a stale position.
    ctx.store().reset_group_positions(canonical)?;
    ctx.store()
        .update_status(canonical, IndexStatus::Indexing, 0, None)?;

    let started = unix_now();
    let clock = Instant::now();

    let events = ctx.events.clone();
    let group_for_events = canonical.to_path_buf();
    let reporting: ProgressFn = Arc::new(move |update: ProgressUpdate| {
        events.publish(IndexEvent::Progress {
            group: group_for_events.clone(),
            percent: update.percent,
            elapsed_ms: update.elapsed.as_millis() as u64,
            remaining_ms: update.remaining.map(|d| d.as_millis() as u64),
        });
        progress(update);
    });

    let outcome = match ctx.engine.index_group(canonical, reporting).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Group index failed for {}: {}", canonical.display(), e);
            ctx.store()
                .update_status(canonical, IndexStatus::Error, 0, Some(&e.to_string()))?;
            ctx.events.publish(IndexEvent::Completed {
                group: canonical.to_path_buf(),
                success: false,
                duration_ms: clock.elapsed().as_millis() as u64,
                lines: 0,
                bytes: 0,
                error: Some(e.to_string()),
            });
            return Err(e);
        }
    };

    let duration_ms = clock.elapsed().as_millis() as i64;
    let total_docs = outcome.total_docs();
    let group_weight = rotation::group_weight(canonical, &ctx.validator)?;
    let min_ts = outcome.min_timestamp.map(|t| t.timestamp());
    let max_ts = outcome.max_timestamp.map(|t| t.timestamp());
    let now = unix_now();

    for (member, docs) in &outcome.per_file_docs {
        let mut record = ctx
            .store()
            .get_record(member)?
            .unwrap_or_else(|| IndexRecord::new(member, canonical));
        record.group_key = canonical.to_path_buf();

        let metadata = std::fs::metadata(member).ok();
        record.last_modified = metadata.as_ref().map(unix_mtime).unwrap_or(0);
        record.last_weight = group_weight as i64;
        record.last_position = if member.as_path() == canonical {
            metadata.map(|m| m.len() as i64).unwrap_or(0)
        } else {
            0
        };
        record.last_indexed = now;
        record.index_started = started;
        record.index_duration_ms = duration_ms;
        record.doc_count = *docs as i64;
        record.min_timestamp = min_ts;
        record.max_timestamp = max_ts;
        record.status = IndexStatus::Indexed;
        record.queue_position = 0;
        record.status_message = None;
        ctx.store().save_record(&record)?;
    }

    // Aggregate metadata lands on the canonical record.
    let mut group_record = ctx
        .store()
        .get_record(canonical)?
        .unwrap_or_else(|| IndexRecord::new(canonical, canonical));
    group_record.group_key = canonical.to_path_buf();
    group_record.index_started = started;
    group_record.index_duration_ms = duration_ms;
    group_record.doc_count = total_docs as i64;
    group_record.min_timestamp = min_ts;
    group_record.max_timestamp = max_ts;
    group_record.last_indexed = now;
    group_record.status = IndexStatus::Indexed;
    group_record.queue_position = 0;
    group_record.status_message = None;
    ctx.store().save_record(&group_record)?;

    ctx.shards.refresh_shards().await?;

    if ctx.mark_completion_notified(canonical) {
        ctx.events.publish(IndexEvent::Completed {
            group: canonical.to_path_buf(),
            success: true,
            duration_ms: duration_ms as u64,
            lines: outcome.lines,
            bytes: outcome.bytes,
            error: None,
        });
    }

    info!(
        "✅ Indexed group {} ({} docs in {}ms)",
        canonical.display(),
        total_docs,
        duration_ms
    );
    Ok(())
}

/// Administrative rebuild: wipe the group's indexed data, reset its records,
/// and enqueue one group-level full task at administrative priority.
pub async fn force_reindex_group(
    ctx: &Arc<SawmillContext>,
    queue: &TaskQueue,
    canonical: &Path,
) -> Result<()> {
    ctx.validator.validate(canonical)?;

    info!("🔨 Forced rebuild requested for group {}", canonical.display());
    ctx.engine.delete_group(canonical).await?;
    ctx.clear_completion_notified(canonical);
    ctx.store().reset_group_records(canonical)?;

    let task = IndexTask::manual_group(canonical.to_path_buf());
    if !queue.submit(task) {
        return Err(IndexError::QueueSaturated);
    }
    Ok(())
}

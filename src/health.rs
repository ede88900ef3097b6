// Health snapshot over the indexing core
//
// Serializable view of what the server is doing right now: tracked file
// count, live task count, and per-status group totals straight from the
// store. Cheap enough to log periodically or expose verbatim.

use crate::context::SawmillContext;
use crate::error::Result;
use crate::tracker::LogTracker;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub tracked_files: usize,
    pub active_tasks: usize,
    pub queue_capacity: usize,
    /// Group counts keyed by persisted status.
    pub groups: BTreeMap<String, i64>,
    /// Current index generation, as the result cache sees it.
    pub total_docs: i64,
    pub latest_modified: i64,
}

pub fn snapshot(ctx: &SawmillContext, tracker: &LogTracker) -> Result<HealthSnapshot> {
    let (groups, generation) = {
        let store = ctx.store();
        (store.group_status_counts()?, store.generation()?)
    };

    let groups = groups
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();

    Ok(HealthSnapshot {
        tracked_files: tracker.tracked_count(),
        active_tasks: ctx.active_tasks.active(),
        queue_capacity: tracker.queue().capacity(),
        groups,
        total_docs: generation.0,
        latest_modified: generation.1,
    })
}

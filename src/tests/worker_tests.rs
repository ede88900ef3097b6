//! Worker execution against real files: incremental offset advance, skip
//! detection, forced full reindex on weight regression, and administrative
//! rebuilds.

use crate::engine::{LineCountEngine, NoopShardRegistry};
use crate::paths::PathValidator;
use crate::store::{IndexRecord, IndexStatus};
use crate::tests::helpers::{stub_context, test_config, test_context};
use crate::tracker::queue::{spawn_workers, TaskQueue};
use crate::tracker::types::{IndexTask, PRIORITY_MANUAL};
use crate::tracker::worker;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new().append(true).create(true).open(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

#[tokio::test]
async fn incremental_pass_advances_offset_and_counts_lines() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    append(&log, "one\ntwo\nthree\n");

    let validator = PathValidator::new(vec![root.to_path_buf()], &[]).unwrap();
    let engine = Arc::new(LineCountEngine::new(validator));
    let ctx = test_context(test_config(root), engine, Arc::new(NoopShardRegistry));

    worker::execute(&ctx, &IndexTask::initial(log.clone(), false)).await.unwrap();

    let record = ctx.store().get_record(&log).unwrap().unwrap();
    assert_eq!(record.doc_count, 3);
    assert_eq!(record.last_position, 14);
    assert_eq!(record.status, IndexStatus::Indexed);

    // Appended lines are picked up from the recorded offset.
    append(&log, "four\nfive\n");
    worker::execute(&ctx, &IndexTask::update(log.clone())).await.unwrap();

    let record = ctx.store().get_record(&log).unwrap().unwrap();
    assert_eq!(record.doc_count, 5);
    assert_eq!(record.last_position, 24);
}

#[tokio::test]
async fn unchanged_file_is_skipped() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    append(&log, "one\ntwo\n");

    let (ctx, engine, _shards) = stub_context(root);

    worker::execute(&ctx, &IndexTask::update(log.clone())).await.unwrap();
    assert_eq!(engine.file_call_count(), 1);

    // Nothing changed on disk; the second pass must not touch the engine.
    worker::execute(&ctx, &IndexTask::update(log.clone())).await.unwrap();
    assert_eq!(engine.file_call_count(), 1);
    assert_eq!(engine.group_call_count(), 0);
}

#[tokio::test]
async fn weight_regression_forces_group_reread() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    append(&log, "one\ntwo\n");

    let (ctx, engine, shards) = stub_context(root);

    // Persisted state claims far more data than the group currently holds,
    // as if rotation dropped a member: weight 1500 recorded, ~8 observed.
    let metadata = fs::metadata(&log).unwrap();
    let mtime = metadata
        .modified()
        .unwrap()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let mut record = IndexRecord::new(&log, &log);
    record.last_modified = mtime;
    record.last_weight = 1500;
    record.last_position = 512;
    record.status = IndexStatus::Indexed;
    ctx.store().save_record(&record).unwrap();

    worker::execute(&ctx, &IndexTask::update(log.clone())).await.unwrap();

    // The whole group was reread instead of resuming from the stale offset.
    assert_eq!(engine.group_call_count(), 1);
    assert_eq!(engine.file_call_count(), 0);

    let record = ctx.store().get_record(&log).unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Indexed);
    assert_ne!(record.last_position, 512, "stale offset must be discarded");
    assert_eq!(record.doc_count, 10);
    assert_eq!(shards.refresh_count(), 1);
}

#[tokio::test]
async fn forced_rebuild_resets_records_and_enqueues_group_task() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    append(&log, "one\n");

    let (ctx, engine, _shards) = stub_context(root);

    let mut record = IndexRecord::new(&log, &log);
    record.doc_count = 42;
    record.last_position = 99;
    record.status = IndexStatus::Indexed;
    ctx.store().save_record(&record).unwrap();

    let (queue, mut rx) = TaskQueue::bounded(8);
    worker::force_reindex_group(&ctx, &queue, &log).await.unwrap();

    // Indexed data wiped, records reset.
    assert_eq!(engine.deleted_groups.lock().unwrap().clone(), vec![log.clone()]);
    let record = ctx.store().get_record(&log).unwrap().unwrap();
    assert_eq!(record.doc_count, 0);
    assert_eq!(record.last_position, 0);
    assert_eq!(record.status, IndexStatus::NotIndexed);

    // One group-level administrative full task was enqueued.
    let task = rx.recv().await.unwrap();
    assert!(task.group_task);
    assert!(task.full);
    assert_eq!(task.priority, PRIORITY_MANUAL);
    assert_eq!(task.path, log);
}

#[tokio::test]
async fn vanished_file_is_not_fatal() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let (ctx, engine, _shards) = stub_context(root);

    let gone = root.join("gone.log");
    worker::execute(&ctx, &IndexTask::update(gone.clone())).await.unwrap();

    assert_eq!(engine.file_call_count(), 0);
    assert!(ctx.store().get_record(&gone).unwrap().is_none());
}

#[tokio::test]
async fn worker_pool_processes_queued_tasks() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    append(&log, "one\ntwo\n");

    let (ctx, engine, _shards) = stub_context(root);

    let (queue, rx) = TaskQueue::bounded(8);
    let _workers = spawn_workers(Arc::clone(&ctx), rx, 2);

    let (task, barrier) = IndexTask::update(log.clone()).with_barrier();
    assert!(queue.submit(task));

    barrier.await.unwrap();
    assert_eq!(engine.file_call_count(), 1);
}

#[tokio::test]
async fn engine_failure_marks_status_error() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    append(&log, "one\n");

    let (ctx, engine, _shards) = stub_context(root);
    engine.fail_next("disk exploded");

    let result = worker::execute(&ctx, &IndexTask::update(log.clone())).await;
    assert!(result.is_err());

    let record = ctx.store().get_record(&log).unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Error);
    assert!(record.status_message.unwrap().contains("disk exploded"));
}

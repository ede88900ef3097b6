//! Scheduler behavior: per-group mutual exclusion, the non-blocking
//! progress probe, global status edges, and completion notification
//! deduplication.

use crate::error::IndexError;
use crate::events::IndexEvent;
use crate::scheduler::TaskScheduler;
use crate::store::IndexStatus;
use crate::tests::helpers::{test_config, test_context, RecordingShards, StubEngine};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn concurrent_schedules_accept_exactly_one() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    fs::write(&log, "one\n").unwrap();

    let engine = StubEngine::with_delay(Duration::from_millis(200));
    let ctx = test_context(test_config(root), engine, RecordingShards::new());
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));

    let mut accepted = Vec::new();
    let mut rejected = 0;
    for _ in 0..5 {
        match scheduler.schedule_index_task(&log, None) {
            Ok(handle) => accepted.push(handle),
            Err(IndexError::TaskInProgress(_)) => rejected += 1,
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }

    assert_eq!(accepted.len(), 1);
    assert_eq!(rejected, 4);
    assert!(scheduler.is_task_in_progress(&log));

    for handle in accepted {
        handle.await.unwrap();
    }

    assert!(!scheduler.is_task_in_progress(&log));
    // The lock arena must not leak entries once everything released.
    assert!(ctx.group_locks.is_empty());
}

#[tokio::test]
async fn independent_groups_run_in_parallel() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let a = root.join("a.log");
    let b = root.join("b.log");
    fs::write(&a, "one\n").unwrap();
    fs::write(&b, "one\n").unwrap();

    let engine = StubEngine::with_delay(Duration::from_millis(100));
    let ctx = test_context(test_config(root), engine.clone(), RecordingShards::new());
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));

    let first = scheduler.schedule_index_task(&a, None).unwrap();
    let second = scheduler.schedule_index_task(&b, None).unwrap();

    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(engine.group_call_count(), 2);
}

#[tokio::test]
async fn three_concurrent_tasks_publish_one_started_one_stopped() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let logs: Vec<_> = ["a.log", "b.log", "c.log"]
        .iter()
        .map(|name| {
            let path = root.join(name);
            fs::write(&path, "one\n").unwrap();
            path
        })
        .collect();

    let engine = StubEngine::with_delay(Duration::from_millis(150));
    let ctx = test_context(test_config(root), engine, RecordingShards::new());
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));
    let mut events = ctx.events.subscribe();

    let handles: Vec<_> = logs
        .iter()
        .map(|log| scheduler.schedule_index_task(log, None).unwrap())
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let mut status_events = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let IndexEvent::StatusChanged { indexing } = event {
            status_events.push(indexing);
        }
    }

    assert_eq!(status_events, vec![true, false]);
}

#[tokio::test]
async fn successful_completion_is_notified_once() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    fs::write(&log, "one\n").unwrap();

    let engine = StubEngine::new();
    let ctx = test_context(test_config(root), engine, RecordingShards::new());
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));
    let mut events = ctx.events.subscribe();

    scheduler.schedule_index_task(&log, None).unwrap().await.unwrap();
    scheduler.schedule_index_task(&log, None).unwrap().await.unwrap();

    let mut completions = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, IndexEvent::Completed { success: true, .. }) {
            completions += 1;
        }
    }
    assert_eq!(completions, 1, "repeat success must not re-notify");
}

#[tokio::test]
async fn failed_task_records_error_status() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    fs::write(&log, "one\n").unwrap();

    let engine = StubEngine::new();
    engine.fail_next("shard write failed");
    let ctx = test_context(test_config(root), engine, RecordingShards::new());
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));

    scheduler.schedule_index_task(&log, None).unwrap().await.unwrap();

    let record = ctx.store().get_record(&log).unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Error);
    assert!(record.status_message.unwrap().contains("shard write failed"));
}

#[tokio::test]
async fn scheduling_after_shutdown_is_refused() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    fs::write(&log, "one\n").unwrap();

    let ctx = test_context(test_config(root), StubEngine::new(), RecordingShards::new());
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));

    ctx.shutdown.trigger();
    assert!(matches!(
        scheduler.schedule_index_task(&log, None),
        Err(IndexError::ShuttingDown)
    ));
}

#[tokio::test]
async fn shutdown_waits_for_active_tasks() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let log = root.join("app.log");
    fs::write(&log, "one\n").unwrap();

    let engine = StubEngine::with_delay(Duration::from_millis(100));
    let ctx = test_context(test_config(root), engine, RecordingShards::new());
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));

    let handle = scheduler.schedule_index_task(&log, None).unwrap();
    scheduler.shutdown().await;

    assert_eq!(ctx.active_tasks.active(), 0);
    handle.await.unwrap();
}

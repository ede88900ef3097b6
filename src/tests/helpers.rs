//! Shared test fixtures: a controllable stub engine, a recording shard
//! registry, and a context builder over a temp directory.

use crate::config::ServerConfig;
use crate::context::SawmillContext;
use crate::engine::{
    FileIndexOutcome, GroupIndexOutcome, IndexingEngine, ProgressFn, ShardRegistry,
};
use crate::error::{IndexError, Result};
use crate::store::IndexStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Engine stub with recorded calls, a configurable delay, and an optional
/// injected failure.
pub struct StubEngine {
    pub group_calls: StdMutex<Vec<PathBuf>>,
    pub file_calls: StdMutex<Vec<(PathBuf, u64)>>,
    pub deleted_groups: StdMutex<Vec<PathBuf>>,
    pub delay: Duration,
    pub fail_with: StdMutex<Option<String>>,
    /// Documents reported per indexed file.
    pub docs_per_file: u64,
    /// How far each incremental pass advances the offset.
    pub offset_advance: u64,
}

impl StubEngine {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            group_calls: StdMutex::new(Vec::new()),
            file_calls: StdMutex::new(Vec::new()),
            deleted_groups: StdMutex::new(Vec::new()),
            delay,
            fail_with: StdMutex::new(None),
            docs_per_file: 10,
            offset_advance: 100,
        })
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn group_call_count(&self) -> usize {
        self.group_calls.lock().unwrap().len()
    }

    pub fn file_call_count(&self) -> usize {
        self.file_calls.lock().unwrap().len()
    }

    fn take_failure(&self) -> Option<String> {
        self.fail_with.lock().unwrap().take()
    }
}

#[async_trait]
impl IndexingEngine for StubEngine {
    async fn index_group(&self, canonical: &Path, _progress: ProgressFn) -> Result<GroupIndexOutcome> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.group_calls.lock().unwrap().push(canonical.to_path_buf());

        if let Some(message) = self.take_failure() {
            return Err(IndexError::Engine(message));
        }

        let mut outcome = GroupIndexOutcome::default();
        outcome
            .per_file_docs
            .insert(canonical.to_path_buf(), self.docs_per_file);
        outcome.lines = self.docs_per_file;
        outcome.bytes = self.docs_per_file * 80;
        Ok(outcome)
    }

    async fn index_file(&self, path: &Path, from_offset: u64) -> Result<FileIndexOutcome> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.file_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), from_offset));

        if let Some(message) = self.take_failure() {
            return Err(IndexError::Engine(message));
        }

        Ok(FileIndexOutcome {
            docs_added: self.docs_per_file,
            new_offset: from_offset + self.offset_advance,
            min_timestamp: None,
            max_timestamp: None,
        })
    }

    async fn delete_group(&self, canonical: &Path) -> Result<()> {
        self.deleted_groups.lock().unwrap().push(canonical.to_path_buf());
        Ok(())
    }
}

/// Shard registry that counts refreshes.
pub struct RecordingShards {
    pub refreshes: AtomicUsize,
}

impl RecordingShards {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShardRegistry for RecordingShards {
    async fn refresh_shards(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test configuration rooted in a temp directory, tuned for fast tests.
pub fn test_config(root: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.data_dir = root.join(".sawmill");
    config.allowed_roots = vec![root.to_path_buf()];
    config.min_index_interval_ms = 100;
    config.queue_capacity = 32;
    config.worker_count = 2;
    config.recovery_grace_ms = 0;
    config.recovery_stagger_ms = 1;
    config
}

/// Build a context over an in-memory store with the given collaborators.
pub fn test_context(
    config: ServerConfig,
    engine: Arc<dyn IndexingEngine>,
    shards: Arc<dyn ShardRegistry>,
) -> Arc<SawmillContext> {
    let store = IndexStore::in_memory().expect("in-memory store");
    SawmillContext::new(config, store, engine, shards).expect("test context")
}

/// Shorthand: context over `root` with a fresh stub engine and recording
/// shards.
pub fn stub_context(root: &Path) -> (Arc<SawmillContext>, Arc<StubEngine>, Arc<RecordingShards>) {
    let engine = StubEngine::new();
    let shards = RecordingShards::new();
    let ctx = test_context(test_config(root), engine.clone(), shards.clone());
    (ctx, engine, shards)
}

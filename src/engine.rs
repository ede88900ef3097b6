//! Collaborator interfaces around the indexing core
//!
//! The orchestration layer never talks to a concrete search engine. It drives
//! whatever implements [`IndexingEngine`] and tells the [`ShardRegistry`]
//! when freshly indexed data should become queryable. The built-in
//! [`LineCountEngine`] gives the standalone server binary a working engine
//! that reads appended bytes and counts lines; production deployments plug in
//! a real full-text engine through the same trait.

use crate::error::{IndexError, Result};
use crate::paths::PathValidator;
use crate::rotation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Progress callback invoked while a group indexes.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// A no-op progress callback for callers that do not report progress.
pub fn noop_progress() -> ProgressFn {
    Arc::new(|_| {})
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub group: PathBuf,
    pub percent: f32,
    pub elapsed: Duration,
    pub remaining: Option<Duration>,
}

/// Result of indexing a whole rotation group.
#[derive(Debug, Clone, Default)]
pub struct GroupIndexOutcome {
    /// Documents produced per physical member file.
    pub per_file_docs: HashMap<PathBuf, u64>,
    pub min_timestamp: Option<DateTime<Utc>>,
    pub max_timestamp: Option<DateTime<Utc>>,
    /// Log lines consumed across the group.
    pub lines: u64,
    /// Bytes consumed across the group.
    pub bytes: u64,
}

impl GroupIndexOutcome {
    pub fn total_docs(&self) -> u64 {
        self.per_file_docs.values().sum()
    }
}

/// Result of incrementally indexing one file from a byte offset.
#[derive(Debug, Clone)]
pub struct FileIndexOutcome {
    pub docs_added: u64,
    /// Offset to persist for the next incremental pass.
    pub new_offset: u64,
    pub min_timestamp: Option<DateTime<Utc>>,
    pub max_timestamp: Option<DateTime<Utc>>,
}

/// The external indexing engine consumed by workers and the scheduler.
#[async_trait]
pub trait IndexingEngine: Send + Sync {
    /// Index every member file of the group from scratch.
    async fn index_group(&self, canonical: &Path, progress: ProgressFn) -> Result<GroupIndexOutcome>;

    /// Resume one file from a previously recorded byte offset.
    async fn index_file(&self, path: &Path, from_offset: u64) -> Result<FileIndexOutcome>;

    /// Discard all indexed data for the group.
    async fn delete_group(&self, canonical: &Path) -> Result<()>;
}

/// Registry of queryable index shards. Refreshed after a group finishes so
/// new data becomes visible to searches.
#[async_trait]
pub trait ShardRegistry: Send + Sync {
    async fn refresh_shards(&self) -> Result<()>;
}

/// Minimal engine backing the standalone server binary: treats every log
/// line as one document and never materializes a search index. Real engines
/// replace it through the trait.
pub struct LineCountEngine {
    validator: PathValidator,
}

impl LineCountEngine {
    pub fn new(validator: PathValidator) -> Self {
        Self { validator }
    }

    fn count_lines_from(&self, path: &Path, from_offset: u64) -> Result<FileIndexOutcome> {
        self.validator.validate(path)?;

        let mut file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound(path.to_path_buf()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(IndexError::PermissionDenied(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        // Compressed members are always consumed whole.
        let start = if rotation::is_compressed(path) { 0 } else { from_offset.min(len) };
        file.seek(SeekFrom::Start(start))?;

        let mut docs: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            docs += buf[..read].iter().filter(|&&b| b == b'\n').count() as u64;
        }

        Ok(FileIndexOutcome {
            docs_added: docs,
            new_offset: len,
            min_timestamp: None,
            max_timestamp: None,
        })
    }
}

#[async_trait]
impl IndexingEngine for LineCountEngine {
    async fn index_group(&self, canonical: &Path, progress: ProgressFn) -> Result<GroupIndexOutcome> {
        let members = rotation::group_member_files(canonical, &self.validator)?;
        let started = std::time::Instant::now();
        let total = members.len().max(1);

        let mut outcome = GroupIndexOutcome::default();
        for (i, member) in members.iter().enumerate() {
            let file_outcome = match self.count_lines_from(member, 0) {
                Ok(o) => o,
                Err(IndexError::NotFound(p)) => {
                    debug!("Group member vanished during indexing: {}", p.display());
                    continue;
                }
                Err(e) => return Err(e),
            };
            outcome.lines += file_outcome.docs_added;
            outcome.bytes += file_outcome.new_offset;
            outcome.per_file_docs.insert(member.clone(), file_outcome.docs_added);

            progress(ProgressUpdate {
                group: canonical.to_path_buf(),
                percent: ((i + 1) as f32 / total as f32) * 100.0,
                elapsed: started.elapsed(),
                remaining: None,
            });
        }

        Ok(outcome)
    }

    async fn index_file(&self, path: &Path, from_offset: u64) -> Result<FileIndexOutcome> {
        self.count_lines_from(path, from_offset)
    }

    async fn delete_group(&self, canonical: &Path) -> Result<()> {
        // No index materialized, nothing to delete.
        debug!("Delete requested for group {}", canonical.display());
        Ok(())
    }
}

/// Shard registry for deployments without a search tier; refreshes are
/// acknowledged and logged only.
pub struct NoopShardRegistry;

#[async_trait]
impl ShardRegistry for NoopShardRegistry {
    async fn refresh_shards(&self) -> Result<()> {
        info!("Shard refresh requested (no search tier attached)");
        Ok(())
    }
}

//! Persisted record types for the index store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle status of a group's index, persisted per path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotIndexed,
    Queued,
    Indexing,
    Indexed,
    Error,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::NotIndexed => "not_indexed",
            IndexStatus::Queued => "queued",
            IndexStatus::Indexing => "indexing",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => IndexStatus::Queued,
            "indexing" => IndexStatus::Indexing,
            "indexed" => IndexStatus::Indexed,
            "error" => IndexStatus::Error,
            _ => IndexStatus::NotIndexed,
        }
    }
}

/// One durable record per physical log file.
///
/// `last_position` is only meaningful for the group's active file and must be
/// reset to zero whenever a full reindex is forced.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub path: PathBuf,
    pub group_key: PathBuf,
    /// Unix mtime observed at the last index pass.
    pub last_modified: i64,
    /// Group weight observed at the last index pass.
    pub last_weight: i64,
    /// Byte offset the next incremental pass resumes from.
    pub last_position: i64,
    /// Unix time of the last successful index pass.
    pub last_indexed: i64,
    /// Unix time the most recent index run started.
    pub index_started: i64,
    pub index_duration_ms: i64,
    pub min_timestamp: Option<i64>,
    pub max_timestamp: Option<i64>,
    pub doc_count: i64,
    pub status: IndexStatus,
    pub queue_position: i64,
    pub status_message: Option<String>,
}

impl IndexRecord {
    pub fn new(path: &Path, group_key: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            group_key: group_key.to_path_buf(),
            last_modified: 0,
            last_weight: 0,
            last_position: 0,
            last_indexed: 0,
            index_started: 0,
            index_duration_ms: 0,
            min_timestamp: None,
            max_timestamp: None,
            doc_count: 0,
            status: IndexStatus::NotIndexed,
            queue_position: 0,
            status_message: None,
        }
    }
}

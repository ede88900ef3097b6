use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Path is outside the allowed log roots: {0}")]
    NotWhitelisted(PathBuf),

    #[error("Malformed log path: {0}")]
    InvalidPath(PathBuf),

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index engine failure: {0}")]
    Engine(String),

    #[error("Task queue saturated")]
    QueueSaturated,

    #[error("An indexing task is already in progress for {0}")]
    TaskInProgress(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("File watcher error: {0}")]
    Watch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server is shutting down")]
    ShuttingDown,
}

impl From<rusqlite::Error> for IndexError {
    fn from(e: rusqlite::Error) -> Self {
        IndexError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

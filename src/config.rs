//! Server configuration
//!
//! Configuration lives in a TOML file inside the data directory and every
//! field has a usable default, so a bare `sawmill-server --log /var/log/app.log`
//! works without any file present. Saves go through a temp file and an atomic
//! rename.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_FILE_NAME: &str = "sawmill.toml";

/// Top-level configuration for the indexing server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Configuration format version.
    pub version: String,

    /// Data directory holding the metadata database and server logs.
    pub data_dir: PathBuf,

    /// Active log files to track. Rotated and compressed siblings are
    /// discovered automatically.
    pub logs: Vec<PathBuf>,

    /// Directories log files must live under. Anything outside is rejected
    /// before any filesystem access.
    pub allowed_roots: Vec<PathBuf>,

    /// Glob patterns excluded from tracking and watching.
    pub exclude_patterns: Vec<String>,

    /// Minimum interval between index runs for the same file (debounce
    /// window), in milliseconds.
    pub min_index_interval_ms: u64,

    /// Bounded task queue capacity. Overflowing tasks are dropped.
    pub queue_capacity: usize,

    /// Index worker pool size. Zero means one worker per CPU.
    pub worker_count: usize,

    /// Delay before the startup recovery pass runs, in milliseconds.
    pub recovery_grace_ms: u64,

    /// Stagger between recovered group task starts, in milliseconds.
    pub recovery_stagger_ms: u64,

    /// How recent an error status must be to qualify for recovery, in
    /// seconds.
    pub recovery_error_window_secs: u64,

    /// Ceiling on recovery attempts per group within one process lifetime.
    pub max_recovery_attempts: u32,

    /// Result cache memory budget in bytes.
    pub cache_budget_bytes: usize,

    /// Result cache entry cap.
    pub cache_max_entries: usize,

    /// Bound on waiting for outstanding tasks during shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            data_dir: PathBuf::from(".sawmill"),
            logs: Vec::new(),
            allowed_roots: Vec::new(),
            exclude_patterns: vec![
                "**/*.tmp".to_string(),
                "**/*.swp".to_string(),
                "**/.sawmill/**".to_string(),
            ],
            min_index_interval_ms: 500,
            queue_capacity: 1024,
            worker_count: 0,
            recovery_grace_ms: 5_000,
            recovery_stagger_ms: 250,
            recovery_error_window_secs: 3_600,
            max_recovery_attempts: 5,
            cache_budget_bytes: 32 * 1024 * 1024,
            cache_max_entries: 256,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, expanding `~` and environment
    /// variables in every path field.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: ServerConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.expand_paths()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the config file if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration with a temp-file write and atomic rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        let temp_path = path.with_extension("toml.tmp");

        fs::write(&temp_path, toml)
            .with_context(|| format!("Failed to write temp config file: {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename temp config file to {}", path.display()))?;

        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Effective worker pool size.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get()
        } else {
            self.worker_count
        }
    }

    /// Allowed roots for the path validator. When none are configured, the
    /// parent directories of the configured logs serve as the allowlist.
    pub fn effective_allowed_roots(&self) -> Vec<PathBuf> {
        if !self.allowed_roots.is_empty() {
            return self.allowed_roots.clone();
        }
        let mut roots: Vec<PathBuf> = self
            .logs
            .iter()
            .filter_map(|log| log.parent().map(Path::to_path_buf))
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }

    fn expand_paths(&mut self) -> Result<()> {
        self.data_dir = expand_path(&self.data_dir)?;
        for log in &mut self.logs {
            *log = expand_path(log)?;
        }
        for root in &mut self.allowed_roots {
            *root = expand_path(root)?;
        }
        Ok(())
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(raw.as_ref())
        .with_context(|| format!("Failed to expand path: {}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sawmill::config::{ServerConfig, CONFIG_FILE_NAME};
use sawmill::context::SawmillContext;
use sawmill::engine::{LineCountEngine, NoopShardRegistry};
use sawmill::paths::PathValidator;
use sawmill::scheduler::{RecoveryManager, TaskScheduler};
use sawmill::store::IndexStore;
use sawmill::tracker::queue::{spawn_workers, TaskQueue};
use sawmill::tracker::LogTracker;
use sawmill::watcher::LogWatcher;

#[derive(Parser, Debug)]
#[command(
    name = "sawmill-server",
    version,
    about = "Sawmill - Rotating Log Indexing Server"
)]
struct Cli {
    /// Path to the configuration file (defaults to <data-dir>/sawmill.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for the metadata database and server logs
    #[arg(long, default_value = ".sawmill")]
    data_dir: PathBuf,

    /// Active log file to track (repeatable)
    #[arg(long = "log")]
    logs: Vec<PathBuf>,

    /// Index worker pool size (0 = one per CPU)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging with both console and file output
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("sawmill=info"))
        .unwrap();

    let logs_dir = cli.data_dir.join("logs");
    fs::create_dir_all(&logs_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create logs directory: {}", e);
    });

    let file_appender = rolling::daily(&logs_dir, "sawmill.log");
    let (non_blocking_file, _file_guard) = non_blocking(file_appender);
    let (non_blocking_console, _console_guard) = non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking_console)
                .with_target(false)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_target(true)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    info!("🚀 Starting Sawmill - Rotating Log Indexing Server");

    // Configuration: file first, CLI overrides on top
    let config_path = cli
        .config
        .unwrap_or_else(|| cli.data_dir.join(CONFIG_FILE_NAME));
    let mut config = ServerConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.data_dir = cli.data_dir.clone();
    if !cli.logs.is_empty() {
        config.logs.extend(cli.logs);
        config.logs.sort();
        config.logs.dedup();
    }
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }

    if config.logs.is_empty() {
        anyhow::bail!("No log files configured; pass --log or set `logs` in the config file");
    }

    let db_dir = config.data_dir.join("db");
    fs::create_dir_all(&db_dir)
        .with_context(|| format!("Failed to create db directory: {}", db_dir.display()))?;

    // Core wiring: store, engine, shared context
    let store = IndexStore::new(db_dir.join("index.db")).context("Failed to open index store")?;
    let validator = PathValidator::new(config.effective_allowed_roots(), &config.exclude_patterns)
        .context("Failed to build path validator")?;
    let engine = Arc::new(LineCountEngine::new(validator));
    let shards = Arc::new(NoopShardRegistry);
    let ctx =
        SawmillContext::new(config.clone(), store, engine, shards).context("Failed to build context")?;

    // Pipeline: bounded queue, worker pool, tracker, watcher
    let (queue, queue_rx) = TaskQueue::bounded(config.queue_capacity);
    let worker_handles = spawn_workers(Arc::clone(&ctx), queue_rx, config.effective_worker_count());

    let tracker = LogTracker::new(Arc::clone(&ctx), queue);
    let discovered = tracker.discover().context("Initial discovery failed")?;
    info!("Tracking {} files across {} configured logs", discovered, config.logs.len());

    let mut watcher = LogWatcher::new(Arc::clone(&ctx), Arc::clone(&tracker))
        .context("Failed to build watcher")?;
    watcher.start().context("Failed to start watcher")?;

    // Recovery of work interrupted by the previous run
    let scheduler = TaskScheduler::new(Arc::clone(&ctx));
    let recovery_ctx = Arc::clone(&ctx);
    let recovery_scheduler = scheduler.clone();
    tokio::spawn(async move {
        let recovery = RecoveryManager::new(recovery_ctx, recovery_scheduler);
        match recovery.run_after_grace().await {
            Ok(count) => info!("Startup recovery complete, {} groups rescheduled", count),
            Err(e) => error!("Startup recovery failed: {}", e),
        }
    });

    match sawmill::health::snapshot(&ctx, &tracker) {
        Ok(health) => info!(
            "Server ready: {}",
            serde_json::to_string(&health).unwrap_or_default()
        ),
        Err(e) => warn!("Failed to take health snapshot: {}", e),
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("Shutdown requested");

    watcher.stop();
    scheduler.shutdown().await;

    // Workers exit on the shutdown signal; give them a moment to drain.
    let drain = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        futures::future::join_all(worker_handles),
    );
    if drain.await.is_err() {
        warn!("Worker pool did not drain before the deadline");
    }

    info!("Sawmill stopped");
    Ok(())
}

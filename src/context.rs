//! Shared server context
//!
//! Everything the indexing core needs — config, validator, store, engine,
//! lock arenas, event bus, shutdown signal — is owned by one context object
//! handed to constructors explicitly. There are no package-level singletons,
//! so tests can build as many isolated contexts as they like.

use crate::config::ServerConfig;
use crate::engine::{IndexingEngine, ShardRegistry};
use crate::error::Result;
use crate::events::EventBus;
use crate::locks::LockArena;
use crate::paths::PathValidator;
use crate::scheduler::status::ActiveTaskCounter;
use crate::store::IndexStore;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::watch;
use tracing::warn;

/// Cooperative shutdown signal broadcast to every background task.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The dependency bundle threaded through the whole indexing core.
pub struct SawmillContext {
    pub config: ServerConfig,
    pub validator: PathValidator,
    pub store: Arc<StdMutex<IndexStore>>,
    pub engine: Arc<dyn IndexingEngine>,
    pub shards: Arc<dyn ShardRegistry>,
    pub events: EventBus,

    /// Serializes index work on one literal file path.
    pub file_locks: LockArena,
    /// Serializes group-level tasks on one canonical path.
    pub group_locks: LockArena,

    pub active_tasks: ActiveTaskCounter,
    pub shutdown: ShutdownSignal,

    // Groups whose successful completion has already been announced; cleared
    // when a full rebuild is forced.
    completion_notified: StdMutex<HashSet<PathBuf>>,
}

impl SawmillContext {
    pub fn new(
        config: ServerConfig,
        store: IndexStore,
        engine: Arc<dyn IndexingEngine>,
        shards: Arc<dyn ShardRegistry>,
    ) -> Result<Arc<Self>> {
        let validator = PathValidator::new(
            config.effective_allowed_roots(),
            &config.exclude_patterns,
        )?;
        let events = EventBus::default();
        let active_tasks = ActiveTaskCounter::new(events.clone());

        Ok(Arc::new(Self {
            config,
            validator,
            store: Arc::new(StdMutex::new(store)),
            engine,
            shards,
            events,
            file_locks: LockArena::new(),
            group_locks: LockArena::new(),
            active_tasks,
            shutdown: ShutdownSignal::new(),
            completion_notified: StdMutex::new(HashSet::new()),
        }))
    }

    /// Lock the store, recovering from a poisoned mutex rather than
    /// propagating the panic of some unrelated task.
    pub fn store(&self) -> MutexGuard<'_, IndexStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Index store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Record that a completion event went out for the group. Returns false
    /// when one was already announced.
    pub fn mark_completion_notified(&self, group: &Path) -> bool {
        self.completion_notified
            .lock()
            .unwrap()
            .insert(group.to_path_buf())
    }

    /// Forget the completion announcement, so the next successful pass
    /// notifies again. Called when a rebuild is forced.
    pub fn clear_completion_notified(&self, group: &Path) {
        self.completion_notified.lock().unwrap().remove(group);
    }
}

//! Keyed lock arena
//!
//! Per-file and per-group mutual exclusion both need a mutex addressed by a
//! string key that exists only while somebody holds or waits on it. The arena
//! creates locks lazily, reference-counts holders and waiters, and removes an
//! entry the moment the last one releases, so the map never grows without
//! bound.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

struct ArenaEntry {
    lock: Arc<TokioMutex<()>>,
    // Holders plus waiters. The entry is removed when this drops to zero.
    refs: usize,
}

#[derive(Default)]
struct ArenaInner {
    entries: StdMutex<HashMap<String, ArenaEntry>>,
}

/// A map of lazily-created, self-removing async mutexes. Cloning is cheap
/// and shares the underlying arena.
#[derive(Clone)]
pub struct LockArena {
    inner: Arc<ArenaInner>,
}

impl LockArena {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArenaInner::default()),
        }
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let lock = self.checkout(key);
        let guard = lock.lock_owned().await;
        KeyedGuard {
            arena: self.clone(),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Non-blocking probe-and-acquire. Returns `None` when the key is busy.
    pub fn try_acquire(&self, key: &str) -> Option<KeyedGuard> {
        let lock = self.checkout(key);
        match lock.try_lock_owned() {
            Ok(guard) => Some(KeyedGuard {
                arena: self.clone(),
                key: key.to_string(),
                guard: Some(guard),
            }),
            Err(_) => {
                self.release(key);
                None
            }
        }
    }

    /// Whether any task currently holds or waits on the key.
    pub fn is_held(&self, key: &str) -> bool {
        self.inner.entries.lock().unwrap().contains_key(key)
    }

    /// Number of live entries; zero once every guard has dropped.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn checkout(&self, key: &str) -> Arc<TokioMutex<()>> {
        let mut entries = self.inner.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert_with(|| ArenaEntry {
            lock: Arc::new(TokioMutex::new(())),
            refs: 0,
        });
        entry.refs += 1;
        Arc::clone(&entry.lock)
    }

    fn release(&self, key: &str) {
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(key);
            }
        }
    }
}

impl Default for LockArena {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for an arena lock. Dropping it releases the mutex and retires
/// the arena entry when no other holder or waiter remains.
pub struct KeyedGuard {
    arena: LockArena,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // Release the mutex before retiring the refcount so a queued waiter
        // observes a consistent entry.
        self.guard.take();
        self.arena.release(&self.key);
    }
}

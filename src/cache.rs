//! Generation-validated result cache
//!
//! Query and statistics results are only reusable while the index they were
//! computed against has not moved. Every entry is stamped with the index
//! generation at computation time, the pair of total document count and
//! newest observed modification time. A stored entry whose stamp no longer
//! matches is stale and is never served, only replaced.
//!
//! Admission is bounded two ways: an LRU entry cap and a memory budget fed
//! by per-entry cost. Entries can be evicted before they go stale; that only
//! costs a recomputation, never correctness.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex as StdMutex;
use tracing::debug;

/// The `(document count, latest modification time)` pair identifying one
/// state of the index.
pub type Generation = (i64, i64);

struct Stored<V> {
    value: V,
    generation: Generation,
    cost: usize,
}

struct CacheInner<V> {
    entries: LruCache<String, Stored<V>>,
    total_cost: usize,
    hits: u64,
    misses: u64,
}

/// Bounded cache of computed results keyed by query fingerprint.
pub struct ResultCache<V> {
    inner: StdMutex<CacheInner<V>>,
    budget: usize,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(max_entries: usize, budget_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            inner: StdMutex::new(CacheInner {
                entries: LruCache::new(capacity),
                total_cost: 0,
                hits: 0,
                misses: 0,
            }),
            budget: budget_bytes,
        }
    }

    /// Normalize a query and derive its cache fingerprint.
    pub fn fingerprint(query: &str) -> String {
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        hex::encode(blake3::hash(normalized.as_bytes()).as_bytes())
    }

    /// Look up a fingerprint at the given generation. A stored entry with a
    /// different stamp is stale: it is dropped, never returned.
    pub fn get(&self, fingerprint: &str, generation: Generation) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();

        enum Probe<V> {
            Hit(V),
            Stale,
            Absent,
        }

        let probe = match inner.entries.get(fingerprint) {
            Some(stored) if stored.generation == generation => Probe::Hit(stored.value.clone()),
            Some(_) => Probe::Stale,
            None => Probe::Absent,
        };

        match probe {
            Probe::Hit(value) => {
                inner.hits += 1;
                Some(value)
            }
            Probe::Stale => {
                if let Some(stored) = inner.entries.pop(fingerprint) {
                    inner.total_cost -= stored.cost;
                    debug!("Evicted stale cache entry {}", fingerprint);
                }
                inner.misses += 1;
                None
            }
            Probe::Absent => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a freshly computed result stamped with its generation.
    pub fn insert(&self, fingerprint: &str, value: V, generation: Generation, cost: usize) {
        let mut inner = self.inner.lock().unwrap();

        if let Some(previous) = inner.entries.pop(fingerprint) {
            inner.total_cost -= previous.cost;
        }
        if let Some((_, evicted)) = inner.entries.push(
            fingerprint.to_string(),
            Stored {
                value,
                generation,
                cost,
            },
        ) {
            inner.total_cost -= evicted.cost;
        }
        inner.total_cost += cost;

        // Shed the coldest entries until the memory budget holds again.
        while inner.total_cost > self.budget && inner.entries.len() > 1 {
            if let Some((_, evicted)) = inner.entries.pop_lru() {
                inner.total_cost -= evicted.cost;
            } else {
                break;
            }
        }
    }

    /// Serve the fingerprint from cache or compute, store, and return it.
    /// The closure returns the value and its cost; it only runs on a miss.
    /// The boolean is the hit flag.
    pub fn get_or_compute<F>(&self, fingerprint: &str, generation: Generation, compute: F) -> (V, bool)
    where
        F: FnOnce() -> (V, usize),
    {
        if let Some(value) = self.get(fingerprint, generation) {
            return (value, true);
        }
        let (value, cost) = compute();
        self.insert(fingerprint, value.clone(), generation, cost);
        (value, false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters since startup.
    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.hits, inner.misses)
    }

    /// Explicit cache clear.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.total_cost = 0;
    }
}

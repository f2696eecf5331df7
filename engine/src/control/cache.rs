//! Result cache
//!
//! Maps a call fingerprint to a previously computed tool result. The cache is
//! a best-effort accelerator: a miss is always safe to recompute, and
//! persistence failures are logged rather than surfaced.
//!
//! # Eviction
//!
//! Size is soft-bounded by `capacity`. When an insert pushes the store over
//! capacity, only the `capacity / 2` most recently written entries survive.
//! Recency is ordered by write timestamp, with a monotonic write sequence
//! breaking ties between writes in the same instant.
//!
//! # Persistence
//!
//! When constructed with a path, the full store is written to a JSON file
//! after every insert and loaded at construction. A missing or corrupt file
//! starts an empty cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::persist::{read_json, write_json};

/// Default soft capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// One cached result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub seq: u64,
}

/// Observability counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    next_seq: u64,
}

/// Bounded fingerprint -> result store shared across turns
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    path: Option<PathBuf>,
    state: Mutex<CacheState>,
}

impl ResultCache {
    /// In-memory cache with no backing file
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            path: None,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Cache backed by `path`, loading any previously persisted entries
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let entries: HashMap<String, CacheEntry> = read_json(&path).unwrap_or_default();
        let next_seq = entries.values().map(|e| e.seq + 1).max().unwrap_or(0);

        info!(
            "Loaded {} cached results from {}",
            entries.len(),
            path.display()
        );

        Self {
            capacity: capacity.max(1),
            path: Some(path),
            state: Mutex::new(CacheState {
                entries,
                next_seq,
                ..CacheState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a fingerprint, counting the hit or miss
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        let mut state = self.lock();
        let found = state.entries.get(fingerprint).map(|e| e.result.clone());
        if found.is_some() {
            state.hits += 1;
            debug!("Cache hit for {}", fingerprint);
        } else {
            state.misses += 1;
        }
        found
    }

    /// Store a result, evicting the older half when over capacity
    pub fn set(&self, fingerprint: impl Into<String>, result: Value) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            fingerprint.into(),
            CacheEntry {
                result,
                timestamp: Utc::now(),
                seq,
            },
        );

        if state.entries.len() > self.capacity {
            let keep = self.capacity / 2;
            let mut ordered: Vec<(String, CacheEntry)> = state.entries.drain().collect();
            ordered.sort_by(|a, b| (b.1.timestamp, b.1.seq).cmp(&(a.1.timestamp, a.1.seq)));
            ordered.truncate(keep);
            state.entries = ordered.into_iter().collect();
            debug!("Cache over capacity, kept {} most recent entries", keep);
        }

        self.persist(&state);
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
        self.persist(&state);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.lock().entries.contains_key(fingerprint)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }

    fn persist(&self, state: &CacheState) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_json(path, &state.entries) {
            warn!("Failed to persist result cache to {}: {}", path.display(), e);
        }
    }
}

//! TTL response store.

use super::key::belongs_to;
use crate::utils::millis;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Stored result. Replaced wholesale on every write, never mutated in place.
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    stored_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    pub key: String,
    pub age_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<EntryStats>,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub dedup_joins: u64,
    pub in_flight: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

/// Most recent successful result per key, with age-based freshness.
///
/// Expired entries are not purged; they stay readable to callers that accept
/// stale data until overwritten or evicted.
#[derive(Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    stats: AtomicStats,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the entry when it is younger than `ttl`.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<Value> {
        let found = self
            .lock()
            .get(key)
            .filter(|e| e.stored_at.elapsed() < ttl)
            .map(|e| e.data.clone());
        let counter = if found.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Returns the entry and its age regardless of freshness.
    pub fn peek(&self, key: &str) -> Option<(Value, Duration)> {
        self.lock()
            .get(key)
            .map(|e| (e.data.clone(), e.stored_at.elapsed()))
    }

    pub fn set(&self, key: impl Into<String>, data: Value) {
        let entry = CacheEntry {
            data,
            stored_at: Instant::now(),
        };
        self.lock().insert(key.into(), entry);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Removes `command` and every `command:<args>` variant.
    pub fn invalidate_by_command(&self, command: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !belongs_to(key, command));
        let removed = before - entries.len();
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        let removed = {
            let mut entries = self.lock();
            let n = entries.len();
            entries.clear();
            n
        };
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Size, per-entry ages (sorted by key) and counters.
    pub fn stats(&self) -> CacheStats {
        let mut entries: Vec<EntryStats> = self
            .lock()
            .iter()
            .map(|(key, e)| EntryStats {
                key: key.clone(),
                age_ms: millis(e.stored_at.elapsed()),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        CacheStats {
            size: entries.len(),
            entries,
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            sets: self.stats.sets.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            dedup_joins: 0,
            in_flight: 0,
        }
    }
}

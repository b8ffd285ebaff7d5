//! Bounded in-memory index from fingerprint to cached artifact.
//!
//! Entries are evicted strictly in insertion order (FIFO): reading an entry
//! does not refresh it. The index owns the lifecycle of the artifacts it
//! references, so evicting or clearing an entry also deletes its file. Those
//! deletions happen after the lock is released and are best-effort.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use prometheus::Gauge;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::fingerprint::Fingerprint;
use crate::metrics::{CACHE_EVICTIONS, CACHE_SIZE};
use crate::models::CacheMetadata;
use crate::store::ArtifactStore;

pub const DEFAULT_CAPACITY: usize = 30;

// Cache entry with timestamp
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub metadata: CacheMetadata,
}

#[derive(Default)]
struct IndexInner {
    entries: HashMap<Fingerprint, CacheEntry>,
    // oldest at the front
    order: VecDeque<Fingerprint>,
}

impl IndexInner {
    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let entry = self.entries.remove(fingerprint)?;
        self.order.retain(|k| k != fingerprint);
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<CacheEntry> {
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest)
    }
}

pub struct CacheIndex {
    inner: Mutex<IndexInner>,
    capacity: usize,
    store: Arc<ArtifactStore>,
    size_gauge: Gauge,
}

impl CacheIndex {
    /// Create an empty index holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, store: Arc<ArtifactStore>) -> Self {
        Self {
            inner: Mutex::new(IndexInner::default()),
            capacity: capacity.max(1),
            store,
            size_gauge: CACHE_SIZE.clone(),
        }
    }

    /// Report the entry count to `gauge` instead of the process-wide one.
    pub fn with_size_gauge(mut self, gauge: Gauge) -> Self {
        self.size_gauge = gauge;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.inner.lock().entries.get(fingerprint).cloned()
    }

    /// Admit a new entry, evicting the oldest one first when full.
    ///
    /// Re-inserting a fingerprint that is already present replaces it; the
    /// replaced entry's artifact is deleted unless it is the same file.
    pub async fn insert(
        &self,
        fingerprint: Fingerprint,
        filename: String,
        metadata: CacheMetadata,
    ) -> CacheEntry {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            filename,
            created_at: Utc::now(),
            metadata,
        };

        let mut doomed = Vec::new();
        {
            let mut inner = self.inner.lock();

            if let Some(replaced) = inner.remove(&fingerprint) {
                if replaced.filename != entry.filename {
                    doomed.push(replaced);
                }
            }

            // capacity check, eviction and admission happen under one lock
            while inner.entries.len() >= self.capacity {
                match inner.pop_oldest() {
                    Some(evicted) => {
                        CACHE_EVICTIONS.inc();
                        tracing::info!(
                            cache_key = %evicted.fingerprint,
                            filename = %evicted.filename,
                            "Evicting oldest cache entry"
                        );
                        doomed.push(evicted);
                    }
                    None => break,
                }
            }

            inner.order.push_back(fingerprint.clone());
            inner.entries.insert(fingerprint, entry.clone());
            // gauge updates stay under the lock so they land in mutation order
            self.size_gauge.set(inner.entries.len() as f64);
        }

        self.delete_artifacts(&doomed).await;
        entry
    }

    /// Drop an entry without touching its artifact.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let removed = inner.remove(fingerprint);
        self.size_gauge.set(inner.entries.len() as f64);
        removed
    }

    /// All entries, oldest first.
    pub fn list_all(&self) -> Vec<CacheEntry> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|k| inner.entries.get(k).cloned())
            .collect()
    }

    /// Empty the index and delete every referenced artifact.
    pub async fn clear(&self) {
        let drained: Vec<CacheEntry> = {
            let mut inner = self.inner.lock();
            let IndexInner { entries, order } = std::mem::take(&mut *inner);
            self.size_gauge.set(0.0);
            let mut entries = entries;
            order.into_iter().filter_map(|k| entries.remove(&k)).collect()
        };

        tracing::info!(count = drained.len(), "Clearing cache");
        self.delete_artifacts(&drained).await;
    }

    async fn delete_artifacts(&self, entries: &[CacheEntry]) {
        for entry in entries {
            match self.store.delete(&entry.filename).await {
                Ok(()) => tracing::debug!(filename = %entry.filename, "Removed cached file"),
                Err(e) => tracing::warn!(
                    filename = %entry.filename,
                    error = %e,
                    "Error removing cached file"
                ),
            }
        }
    }
}

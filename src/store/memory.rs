//! In-process sharded store.
//!
//! Keys are spread over a fixed number of `DashMap` shards by an `ahash`
//! hasher. The scan cursor is simply the next shard to visit, so a full scan
//! takes `num_shards` pages.

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use async_trait::async_trait;
use dashmap::DashMap;

use super::{ScanPage, Store};
use crate::error::StoreError;

pub const DEFAULT_SHARDS: usize = 16;

#[derive(Debug, Default)]
pub struct Shard {
    pub entries: DashMap<String, Vec<u8>>,
}

/// Per-operation call counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub batch_reads: u64,
    pub scans: u64,
    pub sets: u64,
    pub deletes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batch_reads: AtomicU64,
    scans: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

#[derive(Debug)]
pub struct MemoryStore {
    shards: Vec<Shard>,
    counters: Counters,
    hasher: RandomState,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl MemoryStore {
    pub fn new(num_shards: usize) -> Self {
        assert!(num_shards > 0, "num_shards must be > 0");
        let mut shards = Vec::with_capacity(num_shards);
        for _ in 0..num_shards {
            shards.push(Shard::default());
        }
        Self { shards, counters: Counters::default(), hasher: RandomState::new() }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous lookup, handy for assertions.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.shard_for(key).entries.get(key).map(|v| v.clone())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            batch_reads: self.counters.batch_reads.load(Ordering::Relaxed),
            scans: self.counters.scans.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn batch_read(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        self.counters.batch_reads.fetch_add(1, Ordering::Relaxed);
        Ok(keys.iter().map(|k| self.get(k)).collect())
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        _count: usize,
    ) -> Result<ScanPage, StoreError> {
        self.counters.scans.fetch_add(1, Ordering::Relaxed);
        let idx = cursor as usize;
        let Some(shard) = self.shards.get(idx) else {
            return Ok(ScanPage::default());
        };
        let keys = shard
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        let next = if idx + 1 < self.shards.len() { (idx + 1) as u64 } else { 0 };
        Ok(ScanPage { cursor: next, keys })
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.shard_for(key).entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        let mut removed = 0;
        for key in keys {
            if self.shard_for(key).entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

//! Test key provisioning and teardown.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{collect_prefix, KeyScan, Store};

/// Default number of keys held during a run.
pub const DEFAULT_POOL_SIZE: usize = 50_000;
pub const DEFAULT_PREFIX: &str = "test";
const DELETE_CHUNK: usize = 5_000;
const MIN_INDEX_WIDTH: usize = 5;

/// What to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSpec {
    pub prefix: String,
    pub pool_size: usize,
    pub value_size: usize,
}

impl FixtureSpec {
    /// Prefix shared by every test key, including the separator.
    pub fn key_prefix(&self) -> String {
        format!("{}_", self.prefix)
    }

    /// Name of the key with sequence number `index`.
    pub fn key_name(&self, index: usize) -> String {
        let width = digits(self.pool_size.saturating_sub(1)).max(MIN_INDEX_WIDTH);
        format!("{}_{:0width$}", self.prefix, index, width = width)
    }
}

fn digits(mut n: usize) -> usize {
    let mut d = 1;
    while n >= 10 {
        n /= 10;
        d += 1;
    }
    d
}

/// Ordered, read-only list of test keys shared by all workers of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPool {
    keys: Arc<[String]>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys: keys.into() }
    }

    /// A private, mutable copy for one worker to permute.
    pub fn private_copy(&self) -> Vec<String> {
        self.keys.to_vec()
    }
}

impl Deref for KeyPool {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.keys
    }
}

/// Make sure `spec.pool_size` keys exist under the prefix and return them.
///
/// Keys already present are reused; missing ones are written with
/// `spec.value_size` random bytes and no expiry, taking the lowest free
/// sequence numbers.
pub async fn populate<S: Store + ?Sized>(store: &S, spec: &FixtureSpec) -> Result<KeyPool, StoreError> {
    let mut keys = collect_prefix(store, &spec.key_prefix()).await?;
    keys.sort_unstable();
    keys.dedup();
    keys.truncate(spec.pool_size);
    let reused = keys.len();
    debug!(reused, pool_size = spec.pool_size, "found existing test keys");

    let mut present: HashSet<String> = keys.iter().cloned().collect();
    let mut rng = SmallRng::from_entropy();
    let mut payload = vec![0u8; spec.value_size];
    let mut index = 0usize;
    while keys.len() < spec.pool_size {
        let key = spec.key_name(index);
        index += 1;
        if present.contains(&key) {
            continue;
        }
        rng.fill_bytes(&mut payload);
        store.set(&key, &payload).await?;
        present.insert(key.clone());
        keys.push(key);
        let created = keys.len() - reused;
        if created % 10_000 == 0 {
            info!(created, total = keys.len(), "provisioning test keys");
        }
    }
    if keys.len() > reused {
        info!(created = keys.len() - reused, reused, "test keys provisioned");
    }
    Ok(KeyPool::new(keys))
}

/// Delete every key under the prefix, rescanning until nothing is left.
pub async fn clear<S: Store + ?Sized>(store: &S, spec: &FixtureSpec) -> Result<u64, StoreError> {
    let prefix = spec.key_prefix();
    let mut scan = KeyScan::new(store, &prefix);
    let mut total = 0u64;
    loop {
        let mut found = 0usize;
        while let Some(page) = scan.next_page().await? {
            found += page.len();
            for chunk in page.chunks(DELETE_CHUNK) {
                total += store.delete(chunk).await?;
            }
        }
        if found == 0 {
            break;
        }
        debug!(found, "cleanup pass finished, rescanning");
        scan.restart();
    }
    info!(deleted = total, "test keys cleared");
    Ok(total)
}

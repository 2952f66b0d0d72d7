//! Key-value store capability set used by the harness.
//!
//! The harness only needs four operations: a batched read (the thing being
//! measured), a cursor-based prefix scan, a plain set and a multi-key delete.
//! One store instance is shared by every worker; any connection pooling
//! happens behind the trait.

pub mod memory;
pub mod redis;
pub mod resp;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::{MemoryStore, StoreStats};
pub use redis::{RedisOptions, RedisStore};

/// Number of keys asked for per scan page.
pub const SCAN_PAGE_SIZE: usize = 5000;

/// One page of a prefix scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; `0` means the scan is complete.
    pub cursor: u64,
    pub keys: Vec<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the values of `keys` in one request. Missing keys yield `None`.
    async fn batch_read(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError>;

    /// Return one page of keys starting with `prefix`.
    ///
    /// Start with cursor `0`. A page may be empty while the returned cursor is
    /// still non-zero. The scan is not an atomic snapshot: keys written or
    /// removed while it runs may or may not be reported.
    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        count: usize,
    ) -> Result<ScanPage, StoreError>;

    /// Store `value` under `key` without expiry.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;
}

/// Lazy, restartable iteration over the keys under a prefix.
pub struct KeyScan<'a, S: Store + ?Sized> {
    store: &'a S,
    prefix: &'a str,
    cursor: u64,
    done: bool,
}

impl<'a, S: Store + ?Sized> KeyScan<'a, S> {
    pub fn new(store: &'a S, prefix: &'a str) -> Self {
        Self { store, prefix, cursor: 0, done: false }
    }

    /// Fetch the next page, or `None` once the cursor wrapped back to zero.
    pub async fn next_page(&mut self) -> Result<Option<Vec<String>>, StoreError> {
        if self.done {
            return Ok(None);
        }
        let page = self.store.scan_prefix(self.prefix, self.cursor, SCAN_PAGE_SIZE).await?;
        self.cursor = page.cursor;
        self.done = page.cursor == 0;
        Ok(Some(page.keys))
    }

    /// Start over from cursor zero.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.done = false;
    }
}

/// Drain a full prefix scan into a vector.
pub async fn collect_prefix<S: Store + ?Sized>(
    store: &S,
    prefix: &str,
) -> Result<Vec<String>, StoreError> {
    let mut scan = KeyScan::new(store, prefix);
    let mut keys = Vec::new();
    while let Some(page) = scan.next_page().await? {
        keys.extend(page);
    }
    Ok(keys)
}

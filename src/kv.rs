//! Key-Value Store Seam
//!
//! The record catalog and the preference store sit on top of this trait
//! instead of a concrete engine, so the pipelines can run against the
//! durable [`Engine`](crate::engine::Engine) or the in-memory
//! [`MemoryKv`] used by tests and throwaway sessions.
//!
//! ## Scan Semantics
//! `scan(start, end, limit)` yields live entries with `start <= key < end`
//! in ascending key order, at most `limit` of them. `end = None` means
//! unbounded. Deleted keys never appear.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::error::Result;
use crate::wal::Operation;

/// Ordered byte-key store shared across threads
pub trait KvStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Put a key-value pair
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key (no-op if absent)
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Apply every operation in the batch atomically
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Live entries in `[start, end)`, ascending, capped at `limit`
    fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Ordered group of puts and deletes applied as one unit
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<Operation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(Operation::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(Operation::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Collapse into a single loggable operation
    pub fn into_operation(self) -> Operation {
        Operation::Batch { ops: self.ops }
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// `None` when no such key exists (empty or all-`0xFF` prefix).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

// =============================================================================
// In-memory store
// =============================================================================

/// Volatile `KvStore` backed by a BTreeMap
#[derive(Default)]
pub struct MemoryKv {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn apply(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, op: Operation) {
        match op {
            Operation::Put { key, value } => {
                data.insert(key, value);
            }
            Operation::Delete { key } => {
                data.remove(&key);
            }
            Operation::Batch { ops } => {
                for op in ops {
                    Self::apply(data, op);
                }
            }
        }
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self.data.write();
        Self::apply(&mut data, batch.into_operation());
        Ok(())
    }

    fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        let upper = match end {
            Some(end) if start >= end => return Ok(Vec::new()),
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Ok(data
            .range::<[u8], _>((Bound::Included(start), upper))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;
use crate::wal::Operation;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,

    /// Approximate size in bytes (keys + live values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key (value or tombstone)
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair, returning the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut data = self.data.write();
        Self::insert_locked(&mut data, &self.size, key, MemTableEntry::Value(value))
    }

    /// Delete a key (inserts tombstone), returning the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        let mut data = self.data.write();
        Self::insert_locked(&mut data, &self.size, key, MemTableEntry::Tombstone)
    }

    /// Apply a logged operation under a single write lock.
    ///
    /// Readers see either none or all of a batch.
    pub fn apply(&self, operation: Operation) -> usize {
        let mut data = self.data.write();
        Self::apply_locked(&mut data, &self.size, operation);
        self.size.load(Ordering::SeqCst)
    }

    fn apply_locked(
        data: &mut BTreeMap<Vec<u8>, MemTableEntry>,
        size: &AtomicUsize,
        operation: Operation,
    ) {
        match operation {
            Operation::Put { key, value } => {
                Self::insert_locked(data, size, key, MemTableEntry::Value(value));
            }
            Operation::Delete { key } => {
                Self::insert_locked(data, size, key, MemTableEntry::Tombstone);
            }
            Operation::Batch { ops } => {
                for op in ops {
                    Self::apply_locked(data, size, op);
                }
            }
        }
    }

    fn insert_locked(
        data: &mut BTreeMap<Vec<u8>, MemTableEntry>,
        size: &AtomicUsize,
        key: Vec<u8>,
        entry: MemTableEntry,
    ) -> usize {
        let added = key.len() + entry.value_len();
        let key_len = key.len();
        match data.insert(key, entry) {
            Some(old) => {
                // Only mutated under the data write lock, so load/store is not racy
                let removed = key_len + old.value_len();
                let next = (size.load(Ordering::SeqCst) + added).saturating_sub(removed);
                size.store(next, Ordering::SeqCst);
                next
            }
            None => size.fetch_add(added, Ordering::SeqCst) + added,
        }
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Visit entries with `start <= key < end` (`None` = unbounded) in key
    /// order while holding the read lock. Entries are handed out by
    /// reference; the visitor clones only what it keeps.
    pub fn visit_range<R>(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        visitor: impl FnOnce(&mut dyn Iterator<Item = (&Vec<u8>, &MemTableEntry)>) -> R,
    ) -> R {
        let data = self.data.read();
        match end {
            Some(end) if start >= end => visitor(&mut std::iter::empty()),
            Some(end) => {
                let mut range =
                    data.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)));
                visitor(&mut range)
            }
            None => {
                let mut range = data.range::<[u8], _>((Bound::Included(start), Bound::Unbounded));
                visitor(&mut range)
            }
        }
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

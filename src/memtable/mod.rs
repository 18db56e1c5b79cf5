//! MemTable
//!
//! Ordered in-memory buffer of the writes an engine has logged but not yet
//! flushed. Catalog keys are big-endian tuples, so a BTreeMap keeps each
//! dataset's records, business-id index entries and counters contiguous
//! for prefix scans.
//!
//! A write batch is applied under one write guard: a concurrent page fetch
//! sees all of an import batch or none of it. Deletes are kept as
//! tombstones until flush so they can shadow older SSTables.

mod table;

pub use table::MemTable;

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// Bytes of value payload (0 for tombstones)
    pub fn value_len(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }

    /// Borrowed value, `None` for a tombstone
    pub fn as_value(&self) -> Option<&[u8]> {
        match self {
            MemTableEntry::Value(v) => Some(v),
            MemTableEntry::Tombstone => None,
        }
    }
}

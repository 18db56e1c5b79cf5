//! On-disk tables
//!
//! Flushed memtables become immutable SSTables in the engine directory
//! (`catalog/` or `prefs/` under the data dir). Reads consult tables
//! newest first; a scan merges one range reader per table with the
//! memtable on top. Nothing is ever compacted: deleting a dataset writes
//! tombstones that shadow its rows in older tables.

mod manager;
mod sstable;

pub use manager::StorageManager;
pub use sstable::{SSTable, SSTableBuilder, SSTableRange, SSTableReader};

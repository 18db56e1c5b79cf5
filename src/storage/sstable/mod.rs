//! SSTable file layout
//!
//! ```text
//!   0        4        6            14
//!   ┌────────┬────────┬────────────┐
//!   │ "ATGR" │ ver u16│ count  u64 │                      header
//!   ├────────┴────────┴────────────┴──────────────────┐
//!   │ key_len u32 │ val_len u32 │ key │ value          │   data, sorted by key
//!   │ ...                         (val_len = MAX: tombstone, no value)
//!   ├─────────────────────────────────────────────────┤
//!   │ key_len u32 │ offset u64 │ key                   │   index, one per entry
//!   │ ...                                              │
//!   ├─────────────────────────────────────────────────┤
//!   │ index_offset u64 │ data_crc u32 │ pad u32        │   footer (16)
//!   └─────────────────────────────────────────────────┘
//! ```
//!
//! The index is loaded whole on open; point reads and range seeks binary
//! search it and read entries through the shared file handle.

mod builder;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use reader::{SSTableRange, SSTableReader};

/// Magic bytes identifying an AtlasGrid SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"ATGR";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: u64 = 14;

/// Footer size: IndexOffset (8) + DataCRC (4) + Padding (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Summary of a finished SSTable, returned by the builder
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries in this SSTable
    pub entry_count: u64,
    /// Smallest key
    pub min_key: Vec<u8>,
    /// Largest key
    pub max_key: Vec<u8>,
    /// File size in bytes
    pub file_size: u64,
}

/// Read a little-endian u32 at `pos`
pub(crate) fn le_u32(bytes: &[u8], pos: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[pos..pos + 4]);
    u32::from_le_bytes(buf)
}

/// Read a little-endian u64 at `pos`
pub(crate) fn le_u64(bytes: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[pos..pos + 8]);
    u64::from_le_bytes(buf)
}

//! SSTable Reader
//!
//! Opens SSTable files and serves point lookups and range reads through
//! an in-memory key index.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{GridError, Result};

use super::{le_u32, le_u64, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// The file handle sits behind its own mutex so lookups only need `&self`.
pub struct SSTableReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    /// key → file offset of entry
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Loads the entire index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(GridError::Storage(format!(
                "SSTable {} too small: {} bytes",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(GridError::Storage(format!(
                "Invalid SSTable magic: expected ATGR, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(GridError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = le_u64(&header, 6);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let index_offset = le_u64(&footer, 0);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(GridError::Storage(format!(
                "SSTable {} has index offset {} outside the file",
                path.display(),
                index_offset
            )));
        }

        file.seek(SeekFrom::Start(index_offset))?;
        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.read_exact(&mut index_data)?;

        // [key_len(4)][offset(8)][key]
        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos + 12 <= index_data.len() {
            let key_len = le_u32(&index_data, pos) as usize;
            let offset = le_u64(&index_data, pos + 4);
            pos += 12;
            if pos + key_len > index_data.len() {
                return Err(GridError::Storage(format!(
                    "SSTable {} has a truncated index",
                    path.display()
                )));
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
        })
    }

    /// Get a value by key
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found with value
    /// - `Ok(None)`: key found but is a tombstone (deleted)
    /// - `Err(KeyNotFound)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Err(GridError::KeyNotFound),
        };

        let mut file = self.file.lock();
        read_value_at(&mut file, offset)
    }

    /// Entries with `start <= key < end` (`None` = unbounded), values read
    /// lazily from disk
    pub fn range(&self, start: &[u8], end: Option<&[u8]>) -> SSTableRange<'_> {
        let keys = match end {
            Some(end) if start >= end => None,
            Some(end) => Some(
                self.index
                    .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end))),
            ),
            None => Some(
                self.index
                    .range::<[u8], _>((Bound::Included(start), Bound::Unbounded)),
            ),
        };
        SSTableRange {
            keys,
            file: self.file.lock(),
        }
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Quick check if a key might be in this SSTable (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.index.keys().next(), self.index.keys().next_back()) {
            (Some(min), Some(max)) => key >= min.as_slice() && key <= max.as_slice(),
            _ => false,
        }
    }
}

/// Lazy range read over one SSTable
///
/// Holds the table's file lock until dropped.
pub struct SSTableRange<'a> {
    keys: Option<btree_map::Range<'a, Vec<u8>, u64>>,
    file: MutexGuard<'a, BufReader<File>>,
}

impl Iterator for SSTableRange<'_> {
    /// (key, Option<value>): None value means tombstone
    type Item = Result<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, offset) = self.keys.as_mut()?.next()?;
        Some(read_value_at(&mut self.file, *offset).map(|value| (key.clone(), value)))
    }
}

/// Read the value half of the entry at `offset` (None for tombstones)
fn read_value_at(file: &mut BufReader<File>, offset: u64) -> Result<Option<Vec<u8>>> {
    file.seek(SeekFrom::Start(offset))?;

    let mut header = [0u8; 8];
    file.read_exact(&mut header)?;
    let key_len = le_u32(&header, 0);
    let val_len = le_u32(&header, 4);

    // Skip the key, the index already matched it
    file.seek_relative(i64::from(key_len))?;

    if val_len == TOMBSTONE_MARKER {
        return Ok(None);
    }

    let mut value = vec![0u8; val_len as usize];
    file.read_exact(&mut value)?;
    Ok(Some(value))
}

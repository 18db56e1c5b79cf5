//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{GridError, Result};

use super::{WalEntry, HEADER_SIZE};

/// Frames claiming more than this are treated as corruption
const MAX_ENTRY_SIZE: u32 = 512 * 1024 * 1024;

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Offset just past the last entry returned
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns:
    /// - `Ok(Some(entry))`: a complete, checksummed entry
    /// - `Ok(None)`: clean end of log, or a torn (partial) tail
    /// - `Err(WalCorruption)`: a complete frame whose checksum is wrong
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        if !self.read_full(&mut header)? {
            return Ok(None);
        }

        let (lsn, crc, len) = WalEntry::parse_header(&header)?;
        if len > MAX_ENTRY_SIZE {
            return Err(GridError::WalCorruption(format!(
                "entry at lsn {} claims {} bytes",
                lsn, len
            )));
        }

        let mut payload = vec![0u8; len as usize];
        if !self.read_full(&mut payload)? {
            return Ok(None);
        }

        let entry = WalEntry::from_parts(lsn, crc, len, &payload)?;
        self.position += (HEADER_SIZE + payload.len()) as u64;
        Ok(Some(entry))
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset just past the last entry read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` completely; false if the file ended first
    fn read_full(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Iterator over WAL entries
///
/// Stops after the first error.
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

//! Engine Module
//!
//! The embedded storage engine under the record catalog and the
//! preference store.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Handle concurrent read/write access
//! - Trigger flushes when MemTable is full
//! - Manage crash recovery on startup
//! - Merge MemTable and SSTables into ordered range scans
//!
//! ## Write Path
//! ```text
//!   put / delete / write_batch
//!          │
//!          ▼
//!   ┌─────────────┐   one entry per call   ┌──────────┐
//!   │ write_lock  │ ─────────────────────▶ │   WAL    │
//!   └─────────────┘                        └──────────┘
//!          │  apply under one guard
//!          ▼
//!   ┌─────────────┐   size >= limit        ┌──────────┐
//!   │  MemTable   │ ─────────────────────▶ │ SSTables │
//!   └─────────────┘   (flush + truncate)   └──────────┘
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::config::{Config, WalSyncStrategy};
use crate::error::{GridError, Result};
use crate::kv::{KvStore, WriteBatch};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

/// (key, value) where `None` marks a tombstone
type ScanItem = (Vec<u8>, Option<Vec<u8>>);

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/write_batch/flush): serialized by `write_lock`,
///   acquired in the order write_lock → WAL → memtable → storage
/// - **Reads** (get/scan): no write_lock; MemTable and the SSTable list are
///   each behind an RwLock and every SSTable reader locks its own file
pub struct Engine {
    /// Directory holding `wal.log` and `sstables/`
    dir: PathBuf,

    /// Flush threshold in bytes
    memtable_size_limit: usize,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations
    write_lock: Mutex<()>,
}

impl Engine {
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine rooted at `dir`
    ///
    /// On startup:
    /// 1. Create the directory layout
    /// 2. Load existing SSTables
    /// 3. Replay the WAL, flush what it held, truncate it
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        Self::open_with(dir, config.wal_sync_strategy, config.memtable_size_limit)
    }

    /// Open with explicit engine settings
    pub fn open_with(
        dir: &Path,
        wal_sync_strategy: WalSyncStrategy,
        memtable_size_limit: usize,
    ) -> Result<Self> {
        let storage_dir = dir.join(Self::SSTABLE_DIR);
        let wal_path = dir.join(Self::WAL_FILENAME);
        fs::create_dir_all(&storage_dir)?;

        let storage = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_corrupted > 0 || recovery.was_truncated {
                warn!(
                    wal = %wal_path.display(),
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    "WAL tail discarded during recovery"
                );
            } else if recovery.entries_recovered > 0 {
                info!(
                    wal = %wal_path.display(),
                    recovered = recovery.entries_recovered,
                    last_lsn = recovery.last_lsn,
                    "WAL replayed"
                );
            }

            for entry in entries {
                memtable.apply(entry.operation);
            }

            // Recovered data goes to an SSTable before the log is cut
            if !memtable.is_empty() {
                storage.flush(&memtable)?;
                memtable.clear();
            }
        }

        let mut wal = WalWriter::open(&wal_path, wal_sync_strategy)?;
        wal.truncate()?;

        debug!(dir = %dir.display(), sstables = storage.sstable_count(), "engine opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            memtable_size_limit,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
        })
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return match entry {
                MemTableEntry::Value(value) => Ok(Some(value)),
                MemTableEntry::Tombstone => Ok(None),
            };
        }
        self.storage.get(key)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(Operation::Delete { key: key.to_vec() })
    }

    /// Apply a batch as one WAL entry and one MemTable update
    pub fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.write(batch.into_operation())
    }

    /// Live entries in `[start, end)`, ascending, at most `limit`
    ///
    /// Newer sources shadow older ones on equal keys; tombstones hide the
    /// key entirely.
    pub fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.memtable.visit_range(start, end, |mem| {
            self.storage.visit_range(start, end, |tables| {
                let mut sources: Vec<Box<dyn Iterator<Item = Result<ScanItem>> + '_>> =
                    Vec::with_capacity(tables.len() + 1);
                sources.push(Box::new(mem.map(|(key, entry)| {
                    Ok((key.clone(), entry.as_value().map(<[u8]>::to_vec)))
                })));
                for table in tables {
                    sources.push(Box::new(table));
                }
                merge_newest_wins(sources, limit)
            })
        })
    }

    /// Flush memtable to disk regardless of its size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.lock_writes()?;
        self.flush_internal()
    }

    /// Close the engine gracefully
    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.lock_wal()?.sync()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write(&self, operation: Operation) -> Result<()> {
        let _write_guard = self.lock_writes()?;

        // WAL first (durability guarantee)
        self.lock_wal()?.append(operation.clone())?;

        let new_size = self.memtable.apply(operation);
        if new_size >= self.memtable_size_limit {
            self.flush_internal()?;
        }
        Ok(())
    }

    /// Called with write lock held
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        // Entries are now durable in an SSTable
        self.lock_wal()?.truncate()
    }

    fn lock_writes(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| GridError::LockPoisoned(format!("Write lock poisoned: {}", e)))
    }

    fn lock_wal(&self) -> Result<std::sync::MutexGuard<'_, WalWriter>> {
        self.wal
            .lock()
            .map_err(|e| GridError::LockPoisoned(format!("WAL lock poisoned: {}", e)))
    }
}

impl KvStore for Engine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Engine::get(self, key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Engine::put(self, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        Engine::delete(self, key)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        Engine::write_batch(self, batch)
    }

    fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Engine::scan(self, start, end, limit)
    }
}

/// K-way merge of ascending sources ordered newest → oldest.
///
/// On equal keys the lowest-indexed source wins and the rest are skipped.
fn merge_newest_wins<'a>(
    mut sources: Vec<Box<dyn Iterator<Item = Result<ScanItem>> + 'a>>,
    limit: usize,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut heads: Vec<Option<ScanItem>> = Vec::with_capacity(sources.len());
    for source in sources.iter_mut() {
        heads.push(source.next().transpose()?);
    }

    let mut out = Vec::new();
    while out.len() < limit {
        // min_by keeps the first of equal elements, i.e. the newest source
        let winner = heads
            .iter()
            .enumerate()
            .filter_map(|(i, head)| head.as_ref().map(|(key, _)| (i, key)))
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i);
        let Some(winner) = winner else { break };
        let Some((key, value)) = heads[winner].take() else { break };
        heads[winner] = sources[winner].next().transpose()?;

        for i in 0..heads.len() {
            while matches!(&heads[i], Some((k, _)) if *k == key) {
                heads[i] = sources[i].next().transpose()?;
            }
        }

        if let Some(value) = value {
            out.push((key, value));
        }
    }
    Ok(out)
}

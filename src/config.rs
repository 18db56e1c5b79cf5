//! Configuration for AtlasGrid
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for an AtlasGrid session
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── catalog/         (datasets + records engine)
    ///     │   ├── wal.log
    ///     │   └── sstables/
    ///     └── prefs/           (selection + scroll engine)
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Ingestion Configuration
    // -------------------------------------------------------------------------
    /// Normalized rows per persisted batch
    pub import_batch_size: usize,

    /// Batches allowed to wait for the drain worker before decoding blocks
    pub import_queue_depth: usize,

    // -------------------------------------------------------------------------
    // Page Cache Configuration
    // -------------------------------------------------------------------------
    /// Rows per page fetch
    pub page_size: usize,

    /// Extra grid rows requested past the visible end
    pub prefetch_lookahead_rows: usize,

    /// Concurrent page fetch threads per cache
    pub fetch_workers: usize,

    // -------------------------------------------------------------------------
    // Grid Layout Configuration
    // -------------------------------------------------------------------------
    /// Narrowest a card may get before a column is dropped (pixels)
    pub min_card_width: f32,

    /// Horizontal and vertical gap between cards (pixels)
    pub card_gap: f32,

    /// Height of one grid row including its gap (pixels)
    pub row_height: f32,

    /// Quiet period before a scroll offset is persisted
    pub scroll_debounce: Duration,

    // -------------------------------------------------------------------------
    // Export Configuration
    // -------------------------------------------------------------------------
    /// Business ids per indexed lookup during the loading phase
    pub export_read_batch: usize,

    /// Rows per serialization chunk
    pub export_chunk_rows: usize,

    /// How long a finished export reports `Done` before going back to `Idle`
    pub export_done_reset: Duration,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasgrid_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_size_limit: 16 * 1024 * 1024, // 16 MB
            import_batch_size: 500,
            import_queue_depth: 4,
            page_size: 200,
            prefetch_lookahead_rows: 6,
            fetch_workers: 4,
            min_card_width: 180.0,
            card_gap: 16.0,
            row_height: 276.0,
            scroll_debounce: Duration::from_millis(150),
            export_read_batch: 5000,
            export_chunk_rows: 5000,
            export_done_reset: Duration::from_millis(2000),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory of the dataset/record engine
    pub fn catalog_dir(&self) -> PathBuf {
        self.data_dir.join("catalog")
    }

    /// Directory of the preference (selection, scroll) engine
    pub fn prefs_dir(&self) -> PathBuf {
        self.data_dir.join("prefs")
    }

    /// Reject values the pipelines cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let positive = [
            ("import_batch_size", self.import_batch_size),
            ("import_queue_depth", self.import_queue_depth),
            ("page_size", self.page_size),
            ("fetch_workers", self.fetch_workers),
            ("export_read_batch", self.export_read_batch),
            ("export_chunk_rows", self.export_chunk_rows),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(crate::GridError::Config(format!("{} must be > 0", name)));
            }
        }
        if self.min_card_width <= 0.0 || self.row_height <= 0.0 || self.card_gap < 0.0 {
            return Err(crate::GridError::Config(
                "grid layout dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the number of rows per import batch
    pub fn import_batch_size(mut self, rows: usize) -> Self {
        self.config.import_batch_size = rows;
        self
    }

    /// Set how many batches may queue ahead of the drain worker
    pub fn import_queue_depth(mut self, depth: usize) -> Self {
        self.config.import_queue_depth = depth;
        self
    }

    /// Set the page size of the windowed cache
    pub fn page_size(mut self, rows: usize) -> Self {
        self.config.page_size = rows;
        self
    }

    /// Set the prefetch lookahead (in grid rows)
    pub fn prefetch_lookahead_rows(mut self, rows: usize) -> Self {
        self.config.prefetch_lookahead_rows = rows;
        self
    }

    /// Set the number of page fetch threads
    pub fn fetch_workers(mut self, count: usize) -> Self {
        self.config.fetch_workers = count;
        self
    }

    /// Set the grid card geometry
    pub fn card_geometry(mut self, min_card_width: f32, card_gap: f32, row_height: f32) -> Self {
        self.config.min_card_width = min_card_width;
        self.config.card_gap = card_gap;
        self.config.row_height = row_height;
        self
    }

    /// Set the scroll persistence debounce
    pub fn scroll_debounce(mut self, delay: Duration) -> Self {
        self.config.scroll_debounce = delay;
        self
    }

    /// Set the number of business ids per export lookup
    pub fn export_read_batch(mut self, ids: usize) -> Self {
        self.config.export_read_batch = ids;
        self
    }

    /// Set the number of rows per export serialization chunk
    pub fn export_chunk_rows(mut self, rows: usize) -> Self {
        self.config.export_chunk_rows = rows;
        self
    }

    /// Set how long a finished export stays `Done`
    pub fn export_done_reset(mut self, delay: Duration) -> Self {
        self.config.export_done_reset = delay;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

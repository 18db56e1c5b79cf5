//! Windowed page cache
//!
//! A sparse map from flat index to record for one dataset, filled page by
//! page by a small pool of fetch threads. The owning thread never blocks:
//! it queues page numbers, and merges finished pages with [`PageCache::pump`].
//!
//! ```text
//!   request_range ──page──▶ jobs ──▶ fetch worker × N ──▶ RecordStore
//!                                          │
//!   pump / wait_idle ◀──── results ◀───────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::catalog::{Record, RecordStore};
use crate::config::Config;
use crate::error::Result;
use crate::selection::LoadedRecords;

/// A finished page fetch
struct PageResult {
    page: usize,
    records: Result<Vec<Record>>,
}

/// Sparse cache of one dataset's records, bound to `(dataset_id, total_rows)`
pub struct PageCache {
    dataset_id: u64,
    total_rows: usize,
    page_size: usize,
    lookahead_rows: usize,

    /// Flat index → record; absent means not loaded yet
    records: HashMap<usize, Record>,
    /// Pages queued or being fetched
    requested: HashSet<usize>,
    loaded: HashSet<usize>,
    fetches_issued: usize,

    jobs: Sender<usize>,
    results: Receiver<PageResult>,
}

impl PageCache {
    /// Create the cache and start its fetch workers
    ///
    /// Workers finish their current fetch and exit once the cache is dropped.
    pub fn new(
        store: Arc<dyn RecordStore>,
        dataset_id: u64,
        total_rows: usize,
        config: &Config,
    ) -> Result<Self> {
        let (jobs_tx, jobs_rx) = channel::unbounded::<usize>();
        let (results_tx, results_rx) = channel::unbounded::<PageResult>();
        let page_size = config.page_size.max(1);

        for worker in 0..config.fetch_workers.max(1) {
            let store = Arc::clone(&store);
            let jobs = jobs_rx.clone();
            let results = results_tx.clone();
            thread::Builder::new()
                .name(format!("atlasgrid-fetch-{}", worker))
                .spawn(move || {
                    for page in jobs {
                        let records =
                            store.query_records_by_dataset(dataset_id, page * page_size, page_size);
                        if results.send(PageResult { page, records }).is_err() {
                            break;
                        }
                    }
                })?;
        }

        debug!(dataset_id, total_rows, page_size, "page cache created");
        Ok(Self {
            dataset_id,
            total_rows,
            page_size,
            lookahead_rows: config.prefetch_lookahead_rows,
            records: HashMap::new(),
            requested: HashSet::new(),
            loaded: HashSet::new(),
            fetches_issued: 0,
            jobs: jobs_tx,
            results: results_rx,
        })
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Make sure every page overlapping `[first, last]` is loaded or in
    /// flight. Returns how many fetches were issued.
    pub fn request_range(&mut self, first: usize, last: usize) -> usize {
        if self.total_rows == 0 {
            return 0;
        }
        let last = last.min(self.total_rows - 1);
        if first > last {
            return 0;
        }

        let mut issued = 0;
        for page in first / self.page_size..=last / self.page_size {
            if self.loaded.contains(&page) || self.requested.contains(&page) {
                continue;
            }
            if self.jobs.send(page).is_err() {
                warn!(dataset_id = self.dataset_id, page, "fetch workers are gone");
                break;
            }
            self.requested.insert(page);
            issued += 1;
        }
        self.fetches_issued += issued;
        if issued > 0 {
            trace!(dataset_id = self.dataset_id, first, last, issued, "pages requested");
        }
        issued
    }

    /// Prefetch for a visible row window of a grid with `columns` columns.
    ///
    /// Fills forward from page 0 through the page holding the last index
    /// needed by the window plus the lookahead rows.
    pub fn on_visible_rows(&mut self, _first_row: usize, last_row: usize, columns: usize) -> usize {
        if self.total_rows == 0 {
            return 0;
        }
        let max_index = last_row
            .saturating_add(self.lookahead_rows)
            .saturating_add(1)
            .saturating_mul(columns.max(1))
            .saturating_sub(1)
            .min(self.total_rows - 1);
        self.request_range(0, max_index)
    }

    // =========================================================================
    // Merging
    // =========================================================================

    /// Merge every fetch that has completed; never blocks
    pub fn pump(&mut self) -> usize {
        let mut merged = 0;
        while let Ok(result) = self.results.try_recv() {
            merged += self.merge(result);
        }
        merged
    }

    /// Block until no page is in flight or `timeout` passes; true when idle
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.pump();
        while !self.requested.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(result) => {
                    self.merge(result);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false;
                }
            }
        }
        true
    }

    fn merge(&mut self, result: PageResult) -> usize {
        self.requested.remove(&result.page);
        match result.records {
            Ok(records) => {
                let base = result.page * self.page_size;
                for (offset, record) in records.into_iter().enumerate() {
                    self.records.entry(base + offset).or_insert(record);
                }
                self.loaded.insert(result.page);
                1
            }
            Err(e) => {
                // Left unmarked so the next request retries it
                warn!(dataset_id = self.dataset_id, page = result.page, "page fetch failed: {}", e);
                0
            }
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Record at `index`, if its page has arrived
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(&index)
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.records.contains_key(&index)
    }

    pub fn is_page_loaded(&self, page: usize) -> bool {
        self.loaded.contains(&page)
    }

    pub fn is_page_requested(&self, page: usize) -> bool {
        self.requested.contains(&page)
    }

    pub fn loaded_count(&self) -> usize {
        self.records.len()
    }

    pub fn pending_pages(&self) -> usize {
        self.requested.len()
    }

    /// Fetches issued since creation
    pub fn fetches_issued(&self) -> usize {
        self.fetches_issued
    }

    pub fn dataset_id(&self) -> u64 {
        self.dataset_id
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl LoadedRecords for PageCache {
    fn business_id_at(&self, index: usize) -> Option<i64> {
        self.get(index).map(|record| record.business_id)
    }

    fn span(&self) -> usize {
        self.total_rows
    }

    /// Walks the sparse map, never the index range
    fn loaded_between(&self, low: usize, high: usize) -> Vec<i64> {
        let mut hits: Vec<(usize, i64)> = self
            .records
            .iter()
            .filter(|(index, _)| (low..=high).contains(*index))
            .map(|(index, record)| (*index, record.business_id))
            .collect();
        hits.sort_unstable_by_key(|(index, _)| *index);
        hits.into_iter().map(|(_, business_id)| business_id).collect()
    }
}

//! Session Module
//!
//! One user's working state over a data directory: the record catalog,
//! the preference store, the selection, the dataset on screen and the
//! last export.
//!
//! ## Responsibilities
//! - Open both engines (or in-memory stand-ins for tests)
//! - Switch the active dataset: new page cache, new layout, selection restored
//! - Delete a dataset together with its selection and scroll offset
//! - Allow at most one running export
//!
//! ```text
//!                ┌──────────────────────── Session ─────────────────────────┐
//!   begin_import │  RecordStore ◀── PageCache ◀── DatasetView ──▶ ScrollMemory │
//!   open_dataset │       ▲                                            │      │
//!   click/select │       └── SelectionManager ─────▶ prefs KvStore ◀──┘      │
//!   begin_export │                                                           │
//!                └───────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{GridLayout, PageCache, ScrollMemory};
use crate::catalog::{Dataset, KvRecordStore, RecordStore};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{GridError, Result};
use crate::export::{begin_export, ExportFormat, ExportHandle, ExportState};
use crate::ingest::{begin_import, ImportHandle};
use crate::kv::{KvStore, MemoryKv};
use crate::selection::SelectionManager;

// =============================================================================
// DatasetView
// =============================================================================

/// The dataset currently on screen
///
/// Owns the page cache bound to `(dataset.id, dataset.total_rows)`; the
/// cache is dropped with the view.
pub struct DatasetView {
    dataset: Dataset,
    cache: PageCache,
    layout: GridLayout,
    scroll: ScrollMemory,
    scroll_y: f32,
}

impl DatasetView {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PageCache {
        &mut self.cache
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_y
    }

    /// First layout: jump to the saved offset, if any, and prefetch
    pub fn first_layout(&mut self, viewport_height: f32) -> usize {
        if let Some(offset) = self.scroll.take_restore() {
            self.scroll_y = offset.clamp(0.0, self.layout.max_scroll(viewport_height));
            debug!(dataset_id = self.dataset.id, offset = self.scroll_y, "scroll restored");
        }
        self.update_viewport(viewport_height)
    }

    /// A user scroll to `offset`; returns the fetches it caused
    pub fn scroll_to(&mut self, offset: f32, viewport_height: f32) -> usize {
        self.scroll_y = offset.clamp(0.0, self.layout.max_scroll(viewport_height));
        self.scroll.record_scroll(self.scroll_y);
        self.update_viewport(viewport_height)
    }

    /// Viewport width or height changed
    pub fn resize(&mut self, width: f32, viewport_height: f32) -> usize {
        self.layout.resize(width);
        self.scroll_y = self.scroll_y.min(self.layout.max_scroll(viewport_height));
        self.update_viewport(viewport_height)
    }

    /// Report the visible rows to the cache
    pub fn update_viewport(&mut self, viewport_height: f32) -> usize {
        match self.layout.visible_rows(self.scroll_y, viewport_height) {
            Some((first, last)) => self.cache.on_visible_rows(first, last, self.layout.columns()),
            None => 0,
        }
    }

    /// Flat indices on screen, inclusive
    pub fn visible_items(&self, viewport_height: f32) -> Option<(usize, usize)> {
        let (first, last) = self.layout.visible_rows(self.scroll_y, viewport_height)?;
        self.layout.item_range(first, last)
    }

    /// Persist the pending scroll offset now
    pub fn flush(&self) -> Result<()> {
        self.scroll.flush()
    }
}

// =============================================================================
// Session
// =============================================================================

/// Engines kept so `close` can flush them
struct Engines {
    catalog: Arc<Engine>,
    prefs: Arc<Engine>,
}

pub struct Session {
    config: Config,
    store: Arc<dyn RecordStore>,
    prefs: Arc<dyn KvStore>,
    selection: SelectionManager,
    view: Option<DatasetView>,
    export: Option<ExportHandle>,
    engines: Option<Engines>,
}

impl Session {
    /// Open the engines under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Engine::open(&config.catalog_dir(), &config)?);
        let prefs = Arc::new(Engine::open(&config.prefs_dir(), &config)?);
        info!(data_dir = %config.data_dir.display(), "session opened");

        let store: Arc<dyn RecordStore> =
            Arc::new(KvRecordStore::new(Arc::clone(&catalog) as Arc<dyn KvStore>));
        let mut session = Self::with_stores(config, store, Arc::clone(&prefs) as Arc<dyn KvStore>)?;
        session.engines = Some(Engines { catalog, prefs });
        Ok(session)
    }

    /// Session over fresh in-memory stores
    pub fn in_memory(config: Config) -> Result<Self> {
        config.validate()?;
        Self::with_stores(
            config,
            Arc::new(KvRecordStore::in_memory()),
            Arc::new(MemoryKv::new()),
        )
    }

    /// Session over caller-provided stores
    pub fn with_stores(
        config: Config,
        store: Arc<dyn RecordStore>,
        prefs: Arc<dyn KvStore>,
    ) -> Result<Self> {
        let mut selection = SelectionManager::new(Arc::clone(&prefs), Arc::clone(&store))?;

        // A pointer to a dataset that no longer exists is dropped
        if let Some(id) = selection.active_dataset() {
            if store.get_dataset(id)?.is_none() {
                selection.remove_dataset(id)?;
            }
        }

        Ok(Self {
            config,
            store,
            prefs,
            selection,
            view: None,
            export: None,
            engines: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn prefs(&self) -> &Arc<dyn KvStore> {
        &self.prefs
    }

    // =========================================================================
    // Datasets
    // =========================================================================

    pub fn datasets(&self) -> Result<Vec<Dataset>> {
        self.store.list_datasets()
    }

    pub fn begin_import(&self, path: &Path) -> Result<ImportHandle> {
        begin_import(Arc::clone(&self.store), path, &self.config)
    }

    /// Make `dataset_id` the active dataset, laid out `width` pixels wide
    pub fn open_dataset(&mut self, dataset_id: u64, width: f32) -> Result<&mut DatasetView> {
        let dataset = self
            .store
            .get_dataset(dataset_id)?
            .ok_or_else(|| GridError::NotFound(format!("dataset {}", dataset_id)))?;

        self.close_dataset()?;
        self.selection.switch_dataset(Some(dataset_id))?;

        let total = dataset.total_rows as usize;
        let cache = PageCache::new(Arc::clone(&self.store), dataset_id, total, &self.config)?;
        let layout = GridLayout::new(total, width, &self.config);
        let scroll = ScrollMemory::new(Arc::clone(&self.prefs), dataset_id, self.config.scroll_debounce)?;
        info!(dataset_id, rows = total, columns = layout.columns(), "dataset opened");

        Ok(self.view.insert(DatasetView {
            dataset,
            cache,
            layout,
            scroll,
            scroll_y: 0.0,
        }))
    }

    /// Drop the current view, writing its pending scroll offset
    pub fn close_dataset(&mut self) -> Result<()> {
        if let Some(view) = self.view.take() {
            view.flush()?;
        }
        Ok(())
    }

    pub fn view(&self) -> Option<&DatasetView> {
        self.view.as_ref()
    }

    pub fn view_mut(&mut self) -> Option<&mut DatasetView> {
        self.view.as_mut()
    }

    /// Delete a dataset with its records, selection and scroll offset
    pub fn delete_dataset(&mut self, dataset_id: u64) -> Result<()> {
        if self.view.as_ref().is_some_and(|v| v.dataset.id == dataset_id) {
            if let Some(view) = self.view.take() {
                view.scroll.discard();
            }
        }

        self.store.delete_dataset_cascade(dataset_id)?;
        self.selection.remove_dataset(dataset_id)?;
        self.prefs.delete(ScrollMemory::key(dataset_id).as_bytes())?;
        info!(dataset_id, "dataset deleted");
        Ok(())
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionManager {
        &mut self.selection
    }

    /// Click on the card at flat `index` of the open dataset
    ///
    /// The card must be loaded; a placeholder cannot be clicked.
    pub fn click(&mut self, index: usize, shift: bool) -> Result<()> {
        let view = self
            .view
            .as_ref()
            .ok_or_else(|| GridError::NotFound("no open dataset".to_string()))?;
        let business_id = view
            .cache
            .get(index)
            .map(|record| record.business_id)
            .ok_or_else(|| GridError::NotFound(format!("record {} is not loaded", index)))?;
        self.selection.click(index, business_id, shift, &view.cache)
    }

    /// Shift-range over what the open view has loaded
    pub fn extend_range(&mut self, anchor: usize, target: usize) -> Result<usize> {
        let view = self
            .view
            .as_ref()
            .ok_or_else(|| GridError::NotFound("no open dataset".to_string()))?;
        self.selection.extend_range(anchor, target, &view.cache)
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Export the current selection of the active dataset
    pub fn begin_export(&mut self, format: ExportFormat) -> Result<&ExportHandle> {
        if self.export.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(GridError::Busy("an export is already running".to_string()));
        }
        let dataset_id = self
            .selection
            .active_dataset()
            .ok_or_else(|| GridError::NotFound("no active dataset".to_string()))?;
        let dataset = match &self.view {
            Some(view) if view.dataset.id == dataset_id => view.dataset.clone(),
            _ => self
                .store
                .get_dataset(dataset_id)?
                .ok_or_else(|| GridError::NotFound(format!("dataset {}", dataset_id)))?,
        };

        let handle = begin_export(
            Arc::clone(&self.store),
            dataset,
            self.selection.selected_ids(),
            format,
            &self.config,
        )?;
        Ok(self.export.insert(handle))
    }

    pub fn export_state(&self) -> ExportState {
        self.export
            .as_ref()
            .map_or(ExportState::Idle, ExportHandle::state)
    }

    /// Take the last export's handle, e.g. to wait on it
    pub fn take_export(&mut self) -> Option<ExportHandle> {
        self.export.take()
    }

    pub fn cancel_export(&self) {
        if let Some(handle) = &self.export {
            handle.cancel();
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Persist pending state and flush both engines
    pub fn close(mut self) -> Result<()> {
        self.cancel_export();
        self.close_dataset()?;
        if let Some(engines) = self.engines.take() {
            engines.catalog.flush()?;
            engines.prefs.flush()?;
        }
        debug!("session closed");
        Ok(())
    }
}

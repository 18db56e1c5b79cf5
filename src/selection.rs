//! Selection Module
//!
//! The set of selected business ids for the active dataset.
//!
//! ## Responsibilities
//! - Point toggle without needing the record's page
//! - Shift-range extension over whatever is currently loaded
//! - Select all from the record store (complete, not windowed)
//! - Persist one set per dataset plus the active-dataset pointer
//!
//! Membership is by business id only. Flat indices show up solely as
//! gesture input (anchor and range ends) and are never stored.
//!
//! ## Persisted Keys
//! ```text
//! selection:{dataset_id}  →  [business_id, ...]   (absent = empty)
//! selection:active        →  dataset_id           (absent = none)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::RecordStore;
use crate::error::{GridError, Result};
use crate::kv::KvStore;

const ACTIVE_KEY: &str = "selection:active";

/// Business ids of the records a cache currently holds
pub trait LoadedRecords {
    /// `None` when the record at `index` is not loaded
    fn business_id_at(&self, index: usize) -> Option<i64>;

    /// Number of flat indices; valid indices are `0..span()`
    fn span(&self) -> usize;

    /// Loaded business ids in `low..=high`, in index order
    ///
    /// `high` is clamped to the last valid index.
    fn loaded_between(&self, low: usize, high: usize) -> Vec<i64> {
        let Some(last) = self.span().checked_sub(1) else {
            return Vec::new();
        };
        (low..=high.min(last))
            .filter_map(|index| self.business_id_at(index))
            .collect()
    }
}

impl LoadedRecords for [Option<i64>] {
    fn business_id_at(&self, index: usize) -> Option<i64> {
        self.get(index).copied().flatten()
    }

    fn span(&self) -> usize {
        self.len()
    }
}

/// Selection state; the only writer of the persisted selection keys
pub struct SelectionManager {
    prefs: Arc<dyn KvStore>,
    store: Arc<dyn RecordStore>,
    active: Option<u64>,
    selected: BTreeSet<i64>,
    /// Last explicit (non-range) selection point
    anchor: Option<usize>,
}

impl SelectionManager {
    /// Preference key of a dataset's selection
    pub fn key(dataset_id: u64) -> String {
        format!("selection:{}", dataset_id)
    }

    /// Restore the active dataset and its selection from `prefs`
    pub fn new(prefs: Arc<dyn KvStore>, store: Arc<dyn RecordStore>) -> Result<Self> {
        let active = match prefs.get(ACTIVE_KEY.as_bytes())? {
            Some(bytes) => Some(from_json::<u64>(&bytes)?),
            None => None,
        };
        let mut manager = Self {
            prefs,
            store,
            active: None,
            selected: BTreeSet::new(),
            anchor: None,
        };
        if let Some(id) = active {
            manager.selected = manager.load(id)?;
            manager.active = Some(id);
        }
        Ok(manager)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn active_dataset(&self) -> Option<u64> {
        self.active
    }

    pub fn selected(&self) -> &BTreeSet<i64> {
        &self.selected
    }

    pub fn is_selected(&self, business_id: i64) -> bool {
        self.selected.contains(&business_id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    /// Selected ids in ascending order
    pub fn selected_ids(&self) -> Vec<i64> {
        self.selected.iter().copied().collect()
    }

    // =========================================================================
    // Gestures
    // =========================================================================

    /// Flip membership of `business_id`; returns whether it is now selected
    pub fn toggle(&mut self, business_id: i64) -> Result<bool> {
        let dataset_id = self.require_active()?;
        let now_selected = if self.selected.remove(&business_id) {
            false
        } else {
            self.selected.insert(business_id);
            true
        };
        self.persist(dataset_id)?;
        Ok(now_selected)
    }

    /// Click on the card at `index`
    ///
    /// A shift click with an anchor extends the range; anything else
    /// toggles and moves the anchor to `index`.
    pub fn click(
        &mut self,
        index: usize,
        business_id: i64,
        shift: bool,
        loaded: &(impl LoadedRecords + ?Sized),
    ) -> Result<()> {
        match self.anchor {
            Some(anchor) if shift => {
                self.extend_range(anchor, index, loaded)?;
            }
            _ => {
                self.toggle(business_id)?;
                self.anchor = Some(index);
            }
        }
        Ok(())
    }

    /// Add every loaded business id between two flat indices (inclusive,
    /// either order). Unloaded indices are skipped. The anchor stays put.
    ///
    /// Returns how many ids were newly selected.
    pub fn extend_range(
        &mut self,
        anchor: usize,
        target: usize,
        loaded: &(impl LoadedRecords + ?Sized),
    ) -> Result<usize> {
        let dataset_id = self.require_active()?;
        let (low, high) = if anchor <= target {
            (anchor, target)
        } else {
            (target, anchor)
        };

        let mut added = 0;
        for business_id in loaded.loaded_between(low, high) {
            if self.selected.insert(business_id) {
                added += 1;
            }
        }
        if added > 0 {
            self.persist(dataset_id)?;
        }
        debug!(dataset_id, low, high, added, "range extended");
        Ok(added)
    }

    /// Replace the selection with every business id of the dataset
    pub fn select_all(&mut self) -> Result<usize> {
        let dataset_id = self.require_active()?;
        self.selected = self.store.all_business_ids(dataset_id)?.into_iter().collect();
        self.persist(dataset_id)?;
        Ok(self.selected.len())
    }

    pub fn clear(&mut self) -> Result<()> {
        let dataset_id = self.require_active()?;
        self.selected.clear();
        self.anchor = None;
        self.persist(dataset_id)
    }

    // =========================================================================
    // Dataset lifecycle
    // =========================================================================

    /// Make `dataset_id` active, restoring its stored selection
    pub fn switch_dataset(&mut self, dataset_id: Option<u64>) -> Result<()> {
        if let Some(current) = self.active {
            self.persist(current)?;
        }

        self.anchor = None;
        self.selected = match dataset_id {
            Some(id) => self.load(id)?,
            None => BTreeSet::new(),
        };
        self.active = dataset_id;

        match dataset_id {
            Some(id) => self.prefs.put(ACTIVE_KEY.as_bytes(), &to_json(&id)?)?,
            None => self.prefs.delete(ACTIVE_KEY.as_bytes())?,
        }
        debug!(?dataset_id, selected = self.selected.len(), "selection switched");
        Ok(())
    }

    /// Erase the stored selection of a deleted dataset
    pub fn remove_dataset(&mut self, dataset_id: u64) -> Result<()> {
        self.prefs.delete(Self::key(dataset_id).as_bytes())?;
        if self.active == Some(dataset_id) {
            self.active = None;
            self.selected.clear();
            self.anchor = None;
            self.prefs.delete(ACTIVE_KEY.as_bytes())?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn require_active(&self) -> Result<u64> {
        self.active
            .ok_or_else(|| GridError::NotFound("no active dataset".to_string()))
    }

    fn load(&self, dataset_id: u64) -> Result<BTreeSet<i64>> {
        match self.prefs.get(Self::key(dataset_id).as_bytes())? {
            Some(bytes) => Ok(from_json::<Vec<i64>>(&bytes)?.into_iter().collect()),
            None => Ok(BTreeSet::new()),
        }
    }

    fn persist(&self, dataset_id: u64) -> Result<()> {
        let key = Self::key(dataset_id);
        if self.selected.is_empty() {
            return self.prefs.delete(key.as_bytes());
        }
        let ids: Vec<i64> = self.selected.iter().copied().collect();
        self.prefs.put(key.as_bytes(), &to_json(&ids)?)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| GridError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| GridError::Serialization(e.to_string()))
}

//! Catalog Module
//!
//! Datasets and their records, stored on top of a [`KvStore`](crate::kv::KvStore).
//!
//! ## Responsibilities
//! - Assign dataset ids and record primary keys
//! - Keep each dataset's records in insertion order so a flat index is a seek
//! - Index records by business id for selection lookups and export
//! - Delete a dataset and everything under it in one atomic batch
//!
//! ## Key Layout
//! ```text
//! d | dataset(8)                          → Dataset
//! r | dataset(8) | seq(8)                 → Record
//! b | dataset(8) | business_id(8) | seq(8) → ()
//! s | dataset(8)                          → next seq
//! m | name                                → counter
//! ```
//! All integers big-endian; business ids have their sign bit flipped so
//! negative ids sort before positive ones.

mod keys;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use store::KvRecordStore;

/// One persisted catalog row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Storage primary key (global, auto-assigned)
    pub id: u64,
    pub dataset_id: u64,
    pub business_id: i64,
    pub title: String,
    pub source_ref: i64,
    pub images: Vec<String>,
}

/// A normalized row waiting to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub dataset_id: u64,
    pub business_id: i64,
    pub title: String,
    pub source_ref: i64,
    pub images: Vec<String>,
}

/// One imported source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: u64,
    pub name: String,
    pub byte_size: u64,
    pub imported_at: DateTime<Utc>,
    /// Authoritative row count; 0 until the import finishes
    pub total_rows: u64,
}

/// Metadata for a dataset about to be imported
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub name: String,
    pub byte_size: u64,
}

/// Partial update of a dataset; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct DatasetPatch {
    pub name: Option<String>,
    pub total_rows: Option<u64>,
}

impl DatasetPatch {
    pub fn total_rows(total_rows: u64) -> Self {
        Self {
            total_rows: Some(total_rows),
            ..Self::default()
        }
    }
}

/// The record store contract the pipelines are written against
///
/// Every failure comes back as [`GridError::Persistence`](crate::GridError::Persistence).
pub trait RecordStore: Send + Sync {
    /// Create an empty dataset (`total_rows = 0`) and return it with its id
    fn create_dataset(&self, meta: NewDataset) -> Result<Dataset>;

    fn update_dataset(&self, id: u64, patch: DatasetPatch) -> Result<Dataset>;

    fn get_dataset(&self, id: u64) -> Result<Option<Dataset>>;

    /// All datasets, ascending by id
    fn list_datasets(&self) -> Result<Vec<Dataset>>;

    /// Remove the dataset row and every record under it atomically
    fn delete_dataset_cascade(&self, id: u64) -> Result<()>;

    /// Insert records in order; returns how many were written
    fn bulk_insert_records(&self, records: Vec<NewRecord>) -> Result<usize>;

    /// Records `offset..offset + limit` of a dataset in insertion order
    fn query_records_by_dataset(&self, dataset_id: u64, offset: usize, limit: usize)
        -> Result<Vec<Record>>;

    /// Every record of the dataset carrying one of `ids`, in insertion order
    fn query_records_by_business_ids(&self, dataset_id: u64, ids: &[i64]) -> Result<Vec<Record>>;

    fn count_records_by_dataset(&self, dataset_id: u64) -> Result<u64>;

    /// Remove the records of a dataset, keeping the dataset row
    fn delete_records_by_dataset(&self, dataset_id: u64) -> Result<()>;

    /// Distinct business ids of a dataset, ascending
    fn all_business_ids(&self, dataset_id: u64) -> Result<Vec<i64>>;
}

//! Loading phase: selected business ids back to export rows

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::catalog::RecordStore;
use crate::error::{GridError, Result};
use crate::protocol::ExportRow;

/// Share of overall progress taken by loading
pub const LOADING_WEIGHT: f32 = 50.0;

/// Resolve `ids` to rows of `dataset_id`, `batch` ids per indexed lookup
///
/// `on_progress` gets 0–50 as ids are resolved. Records of other datasets
/// are filtered out.
pub fn load_rows(
    store: &dyn RecordStore,
    dataset_id: u64,
    ids: &[i64],
    batch: usize,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(f32),
) -> Result<Vec<ExportRow>> {
    let total = ids.len();
    let mut rows = Vec::with_capacity(total);
    let mut resolved = 0usize;

    for chunk in ids.chunks(batch.max(1)) {
        if cancel.load(Ordering::SeqCst) {
            return Err(GridError::Cancelled);
        }
        let records = store.query_records_by_business_ids(dataset_id, chunk)?;
        rows.extend(
            records
                .into_iter()
                .filter(|record| record.dataset_id == dataset_id)
                .map(ExportRow::from),
        );
        resolved += chunk.len();
        on_progress(LOADING_WEIGHT * resolved as f32 / total as f32);
    }

    if total == 0 {
        on_progress(LOADING_WEIGHT);
    }
    debug!(dataset_id, ids = total, rows = rows.len(), "export rows loaded");
    Ok(rows)
}

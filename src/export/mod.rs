//! Export Module
//!
//! Selected records out to a CSV or JSON payload.
//!
//! ## Responsibilities
//! - Resolve the selected business ids against the record store (loading)
//! - Serialize the rows in fixed-size chunks on a worker thread (exporting)
//! - Report progress as one 0–100 scale across both phases
//! - Name the artifact after the dataset and the export time
//!
//! ```text
//!   ids ─▶ controller: load_rows (0–50) ─▶ ExportCommand ─▶ serialize worker (50–100) ─▶ Done{payload}
//! ```
//!
//! The payload is handed back to the caller; writing it somewhere is the
//! caller's business.

mod format;
mod loader;
mod pipeline;
mod worker;

pub use format::{serialize_rows, ChunkSerializer, ExportFormat, CSV_HEADER};
pub use loader::{load_rows, LOADING_WEIGHT};
pub use pipeline::{
    begin_export, export_controller, ExportArtifact, ExportController, ExportEvent, ExportHandle,
    ExportState, ExportStatus,
};
pub use worker::spawn_export_worker;

//! Export worker messages

use serde::{Deserialize, Serialize};

use crate::catalog::Record;
use crate::export::ExportFormat;

/// The four exported columns of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub business_id: i64,
    pub title: String,
    pub source_ref: i64,
    pub images: Vec<String>,
}

impl From<Record> for ExportRow {
    fn from(record: Record) -> Self {
        Self {
            business_id: record.business_id,
            title: record.title,
            source_ref: record.source_ref,
            images: record.images,
        }
    }
}

/// Inbound to the serialize worker
#[derive(Debug, Clone)]
pub enum ExportCommand {
    Export {
        format: ExportFormat,
        rows: Vec<ExportRow>,
        filename: String,
    },
}

/// Outbound from the serialize worker
#[derive(Debug, Clone, PartialEq)]
pub enum ExportMessage {
    /// Overall export progress, 0.0 to 100.0
    Progress { percent: f32 },

    Done { payload: Vec<u8>, filename: String },

    Error { message: String },
}

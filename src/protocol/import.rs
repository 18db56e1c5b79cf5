//! Ingestion worker messages

use std::path::PathBuf;

use super::Progress;
use crate::catalog::NewRecord;

/// Inbound to the decode worker
#[derive(Debug, Clone)]
pub enum ImportCommand {
    /// Decode `path`, stamping every row with `dataset_id`
    Parse { path: PathBuf, dataset_id: u64 },
}

/// Outbound from the decode worker
#[derive(Debug, Clone, PartialEq)]
pub enum ImportMessage {
    Progress(Progress),

    /// One full (or final partial) batch of normalized rows
    Chunk { rows: Vec<NewRecord>, dataset_id: u64 },

    /// Decoding finished; `total_rows` rows were sent in chunks
    Done { total_rows: u64, dataset_id: u64 },

    Error { message: String },
}

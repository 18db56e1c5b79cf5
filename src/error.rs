//! Error types for AtlasGrid
//!
//! Provides a unified error type for all operations. The pipeline-level
//! variants (`Decode`, `Validation`, `Persistence`, `Cancelled`) are what
//! import and export report to their callers; the rest come from the
//! embedded engine underneath.

use thiserror::Error;

/// Result type alias using GridError
pub type Result<T> = std::result::Result<T, GridError>;

/// Unified error type for AtlasGrid operations
#[derive(Debug, Error)]
pub enum GridError {
    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Malformed source file; aborts the import
    #[error("Decode error: {0}")]
    Decode(String),

    /// A single row was rejected; never escalates past the decoder
    #[error("Invalid row: {0}")]
    Validation(String),

    /// Storage write/read failure surfaced by a pipeline
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// User-initiated abort of an import or export
    #[error("Operation cancelled")]
    Cancelled,

    /// A worker thread went away without reporting a result
    #[error("Worker failure: {0}")]
    Worker(String),

    /// Another operation of the same kind is still running
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl GridError {
    /// True for the user-initiated abort path
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GridError::Cancelled)
    }

    /// Wrap any engine-level failure as a pipeline persistence error.
    ///
    /// Pipeline errors and cancellation pass through untouched.
    pub fn into_persistence(self) -> Self {
        match self {
            GridError::Persistence(_)
            | GridError::Cancelled
            | GridError::Decode(_)
            | GridError::Validation(_)
            | GridError::Worker(_) => self,
            other => GridError::Persistence(other.to_string()),
        }
    }
}

impl From<bincode::Error> for GridError {
    fn from(e: bincode::Error) -> Self {
        GridError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for GridError {
    fn from(e: csv::Error) -> Self {
        GridError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(e: serde_json::Error) -> Self {
        GridError::Decode(e.to_string())
    }
}

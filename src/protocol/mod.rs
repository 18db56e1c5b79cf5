//! Protocol Module
//!
//! Messages exchanged between the pipeline controllers and their worker
//! threads. Workers never share mutable state with a controller; every
//! interaction is one of these values sent over a crossbeam channel, in
//! order.
//!
//! ```text
//!   controller ── ImportCommand ──▶ decode worker
//!   controller ◀── ImportMessage ── decode worker   (Progress | Chunk | Done | Error)
//!
//!   controller ── ExportCommand ──▶ serialize worker
//!   controller ◀── ExportMessage ── serialize worker (Progress | Done | Error)
//! ```

mod export;
mod import;

pub use export::{ExportCommand, ExportMessage, ExportRow};
pub use import::{ImportCommand, ImportMessage};

/// Running import counters
///
/// `processed` counts rows that passed normalization; `total_seen` counts
/// every decoded row, dropped ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub processed: u64,
    pub total_seen: u64,
}

impl Progress {
    /// Rows rejected so far
    pub fn dropped(&self) -> u64 {
        self.total_seen - self.processed
    }
}

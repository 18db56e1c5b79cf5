//! Ingest Module
//!
//! Streaming import of a source file into the record catalog.
//!
//! ## Responsibilities
//! - Create the dataset row before any record references it
//! - Decode the file incrementally on a worker thread
//! - Normalize rows, dropping those without a usable business id
//! - Persist fixed-size batches in order through a single drain thread
//! - Write `total_rows` only after every batch is stored
//! - Roll the dataset back on failure or cancellation
//!
//! ```text
//!  file ─▶ decode worker ─(Chunk/Progress/Done)─▶ controller ─▶ bounded queue ─▶ drain ─▶ RecordStore
//! ```

mod decoder;
mod normalize;
mod pipeline;
mod worker;

pub use decoder::{decode_delimited, decode_file, decode_json, SourceFormat};
pub use normalize::{normalize, parse_images, parse_integer, Column, RawRow};
pub use pipeline::{begin_import, ImportController, ImportEvent, ImportHandle, ImportState};
pub use worker::spawn_decode_worker;

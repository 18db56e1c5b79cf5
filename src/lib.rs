//! # AtlasGrid
//!
//! A windowed data pipeline for very large tabular datasets:
//! - Streaming import of delimited or JSON files into an embedded store
//! - Paged, lazily fetched cache behind a virtualized grid
//! - Per-dataset persistent selection keyed by business id
//! - Chunked CSV/JSON export of a selection with progress
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Session                              │
//! │        (interactive thread: view, selection, handles)        │
//! └──────┬──────────────┬──────────────┬──────────────┬─────────┘
//!        │              │              │              │
//!        ▼              ▼              ▼              ▼
//!  ┌──────────┐   ┌──────────┐   ┌───────────┐  ┌──────────┐
//!  │  Ingest  │   │PageCache │   │ Selection │  │  Export  │
//!  │ decode ▶ │   │ fetch ×N │   │  Manager  │  │ load ▶   │
//!  │  drain   │   │          │   │           │  │ serialize│
//!  └────┬─────┘   └────┬─────┘   └─────┬─────┘  └────┬─────┘
//!       │              │               │             │
//!       ▼              ▼               ▼             ▼
//!  ┌───────────────────────────┐  ┌───────────────────────────┐
//!  │   Catalog (RecordStore)   │  │   Preferences (KvStore)   │
//!  └─────────────┬─────────────┘  └─────────────┬─────────────┘
//!                └───────────────┬──────────────┘
//!                                ▼
//!                    ┌───────────────────────┐
//!                    │ Engine: WAL, MemTable │
//!                    │       SSTables        │
//!                    └───────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod kv;
pub mod engine;

pub mod catalog;
pub mod protocol;
pub mod ingest;
pub mod cache;
pub mod selection;
pub mod export;
pub mod session;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{GridError, Result};
pub use config::{Config, WalSyncStrategy};
pub use engine::Engine;
pub use kv::{KvStore, MemoryKv, WriteBatch};
pub use catalog::{Dataset, KvRecordStore, NewDataset, NewRecord, Record, RecordStore};
pub use export::{ExportFormat, ExportHandle, ExportState};
pub use ingest::{ImportHandle, ImportState};
pub use selection::SelectionManager;
pub use session::{DatasetView, Session};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasGrid
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Write-Ahead Log
//!
//! Every engine (the record catalog and the preference store each own one)
//! logs a mutation here before touching its memtable. An import batch, a
//! cascade delete or a selection rewrite is one `Operation::Batch`, framed
//! and checksummed as a single entry, so recovery replays it whole or not
//! at all.
//!
//! ```text
//!   offset 0
//!   ┌──────────┬──────────┬──────────┬─────────────────────┐
//!   │ lsn  u64 │ crc  u32 │ len  u32 │ bincode(Operation)  │  entry 1
//!   ├──────────┼──────────┼──────────┼─────────────────────┤
//!   │ lsn  u64 │ crc  u32 │ len  u32 │ bincode(Operation)  │  entry 2
//!   └──────────┴──────────┴──────────┴─────────────────────┘
//!   crc covers lsn, len and payload; a bad crc or short tail ends replay
//! ```
//!
//! After a successful open the log is replayed into an SSTable and
//! truncated, so it only ever holds writes since the last open or flush.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE};
pub use writer::WalWriter;
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};

//! Serialize worker
//!
//! Turns loaded rows into the export payload on its own thread, one
//! fixed-size chunk at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;
use tracing::debug;

use super::format::ChunkSerializer;
use super::loader::LOADING_WEIGHT;
use crate::error::{GridError, Result};
use crate::protocol::{ExportCommand, ExportMessage};

/// Spawn a serialize worker for `command`
///
/// Sends `Progress` (50–100) after each chunk, then one `Done` or `Error`.
/// A cancelled worker stops without sending a result.
pub fn spawn_export_worker(
    command: ExportCommand,
    chunk_rows: usize,
    cancel: Arc<AtomicBool>,
    tx: Sender<ExportMessage>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("atlasgrid-serialize".to_string())
        .spawn(move || match run(command, chunk_rows.max(1), &cancel, &tx) {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("serialization cancelled"),
            Err(e) => {
                let _ = tx.send(ExportMessage::Error {
                    message: e.to_string(),
                });
            }
        })?;
    Ok(handle)
}

fn run(
    command: ExportCommand,
    chunk_rows: usize,
    cancel: &AtomicBool,
    tx: &Sender<ExportMessage>,
) -> Result<()> {
    let ExportCommand::Export {
        format,
        rows,
        filename,
    } = command;

    let total = rows.len();
    let mut serializer = ChunkSerializer::new(format)?;
    for chunk in rows.chunks(chunk_rows) {
        if cancel.load(Ordering::SeqCst) {
            return Err(GridError::Cancelled);
        }
        serializer.write_chunk(chunk)?;
        let percent = LOADING_WEIGHT + (100.0 - LOADING_WEIGHT) * serializer.rows() as f32 / total as f32;
        send(tx, ExportMessage::Progress { percent })?;
    }
    if cancel.load(Ordering::SeqCst) {
        return Err(GridError::Cancelled);
    }

    let payload = serializer.finish()?;
    debug!(rows = total, bytes = payload.len(), %format, "export serialized");
    send(tx, ExportMessage::Progress { percent: 100.0 })?;
    send(tx, ExportMessage::Done { payload, filename })
}

fn send(tx: &Sender<ExportMessage>, message: ExportMessage) -> Result<()> {
    tx.send(message).map_err(|_| GridError::Cancelled)
}

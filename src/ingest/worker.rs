//! Decode worker
//!
//! Runs on its own thread: decodes the source, normalizes each row and
//! sends fixed-size batches back to the controller. It never touches the
//! record store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;
use tracing::{debug, trace};

use super::decoder::decode_file;
use super::normalize::normalize;
use crate::catalog::NewRecord;
use crate::error::{GridError, Result};
use crate::protocol::{ImportCommand, ImportMessage, Progress};

/// Spawn a decode worker for `command`
///
/// Messages arrive on `tx` in order: `Chunk`/`Progress` pairs, then exactly
/// one `Done` or `Error`. A cancelled worker just stops sending.
pub fn spawn_decode_worker(
    command: ImportCommand,
    batch_size: usize,
    cancel: Arc<AtomicBool>,
    tx: Sender<ImportMessage>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("atlasgrid-decode".to_string())
        .spawn(move || {
            if let Err(e) = run(command, batch_size.max(1), &cancel, &tx) {
                if e.is_cancelled() {
                    debug!("decode cancelled");
                } else {
                    // The controller wraps the message in `Decode` again
                    let message = match e {
                        GridError::Decode(message) => message,
                        other => other.to_string(),
                    };
                    // The controller may already be gone
                    let _ = tx.send(ImportMessage::Error { message });
                }
            }
        })?;
    Ok(handle)
}

fn run(
    command: ImportCommand,
    batch_size: usize,
    cancel: &AtomicBool,
    tx: &Sender<ImportMessage>,
) -> Result<()> {
    let ImportCommand::Parse { path, dataset_id } = command;
    debug!(path = %path.display(), dataset_id, "decode started");

    let mut progress = Progress::default();
    let mut batch: Vec<NewRecord> = Vec::with_capacity(batch_size);

    decode_file(&path, |raw| {
        if cancel.load(Ordering::Relaxed) {
            return Err(GridError::Cancelled);
        }
        progress.total_seen += 1;

        match normalize(raw, dataset_id) {
            Ok(record) => {
                progress.processed += 1;
                batch.push(record);
            }
            Err(e) => trace!(row = progress.total_seen, "row dropped: {}", e),
        }

        if batch.len() >= batch_size {
            let rows = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            send(tx, ImportMessage::Chunk { rows, dataset_id })?;
            send(tx, ImportMessage::Progress(progress))?;
        }
        Ok(())
    })?;

    if cancel.load(Ordering::Relaxed) {
        return Err(GridError::Cancelled);
    }
    if !batch.is_empty() {
        send(tx, ImportMessage::Chunk { rows: batch, dataset_id })?;
    }
    send(tx, ImportMessage::Progress(progress))?;
    send(
        tx,
        ImportMessage::Done {
            total_rows: progress.processed,
            dataset_id,
        },
    )?;

    debug!(
        dataset_id,
        processed = progress.processed,
        dropped = progress.dropped(),
        "decode finished"
    );
    Ok(())
}

/// A closed channel means the controller stopped listening
fn send(tx: &Sender<ImportMessage>, message: ImportMessage) -> Result<()> {
    tx.send(message).map_err(|_| GridError::Cancelled)
}

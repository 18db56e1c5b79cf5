//! Import controller
//!
//! A single-threaded state machine driven by the decode worker's messages.
//! Batches go to one drain thread through a bounded queue so at most one
//! bulk insert is in flight and memory stays at batch size × queue depth.
//!
//! ```text
//!   Idle ──▶ Parsing ──▶ Saving ──▶ Done
//!              │  ▲         │
//!              │  └─cancel──┤──▶ Idle   (dataset deleted)
//!              └──error─────┴──▶ Error  (dataset deleted)
//! ```

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::worker::spawn_decode_worker;
use crate::catalog::{Dataset, DatasetPatch, NewDataset, NewRecord, RecordStore};
use crate::config::Config;
use crate::error::{GridError, Result};
use crate::protocol::{ImportCommand, ImportMessage, Progress};

/// Where an import currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Parsing,
    /// Decoding finished, waiting for the drain to empty
    Saving,
    Done,
    Error(String),
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportState::Idle => write!(f, "idle"),
            ImportState::Parsing => write!(f, "parsing"),
            ImportState::Saving => write!(f, "saving"),
            ImportState::Done => write!(f, "done"),
            ImportState::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Observable import events, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    State(ImportState),
    Progress(Progress),
}

/// Shared state of a running import
struct Shared {
    state: Arc<RwLock<ImportState>>,
    cancel: Arc<AtomicBool>,
    events: Sender<ImportEvent>,
}

impl Shared {
    fn set_state(&self, state: ImportState) {
        *self.state.write() = state.clone();
        // Nobody listening is fine
        let _ = self.events.send(ImportEvent::State(state));
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Drives one import from worker messages to a finalized dataset
pub struct ImportController {
    store: Arc<dyn RecordStore>,
    dataset: Dataset,
    queue_depth: usize,
    shared: Shared,
}

impl ImportController {
    /// Controller for `dataset`, which must already exist with `total_rows = 0`
    ///
    /// Returns the controller, its cancel flag, shared state and the event
    /// stream.
    pub fn new(
        store: Arc<dyn RecordStore>,
        dataset: Dataset,
        queue_depth: usize,
    ) -> (Self, Arc<AtomicBool>, Arc<RwLock<ImportState>>, Receiver<ImportEvent>) {
        let (events_tx, events_rx) = channel::unbounded();
        let shared = Shared {
            state: Arc::new(RwLock::new(ImportState::Idle)),
            cancel: Arc::new(AtomicBool::new(false)),
            events: events_tx,
        };
        let cancel = Arc::clone(&shared.cancel);
        let state = Arc::clone(&shared.state);
        let controller = Self {
            store,
            dataset,
            queue_depth: queue_depth.max(1),
            shared,
        };
        (controller, cancel, state, events_rx)
    }

    /// Consume worker messages until the import finishes, fails or is
    /// cancelled. Any outcome other than `Ok` leaves the dataset deleted.
    pub fn drive(self, rx: Receiver<ImportMessage>) -> Result<Dataset> {
        self.shared.set_state(ImportState::Parsing);

        let (batch_tx, batch_rx) = channel::bounded::<Vec<NewRecord>>(self.queue_depth);
        let cancel = Arc::clone(&self.shared.cancel);
        let drain = match spawn_drain(Arc::clone(&self.store), batch_rx, cancel) {
            Ok(drain) => drain,
            Err(e) => return self.abort(None, e),
        };
        let dataset_id = self.dataset.id;

        loop {
            if self.shared.cancelled() {
                drop(batch_tx);
                return self.abort(Some(drain), GridError::Cancelled);
            }

            let message = match rx.recv() {
                Ok(message) => message,
                Err(_) => {
                    drop(batch_tx);
                    let err = if self.shared.cancelled() {
                        GridError::Cancelled
                    } else {
                        GridError::Worker("decode worker exited without finishing".to_string())
                    };
                    return self.abort(Some(drain), err);
                }
            };

            match message {
                ImportMessage::Progress(progress) => {
                    let _ = self.shared.events.send(ImportEvent::Progress(progress));
                }
                ImportMessage::Chunk { rows, dataset_id: target } => {
                    if target != dataset_id {
                        drop(batch_tx);
                        let err = GridError::Worker(format!(
                            "chunk for dataset {} reached import of {}",
                            target, dataset_id
                        ));
                        return self.abort(Some(drain), err);
                    }
                    if batch_tx.send(rows).is_err() {
                        // Drain stopped early; its result carries the reason
                        drop(batch_tx);
                        let err = match join_drain(drain) {
                            Err(e) => e,
                            Ok(_) => GridError::Worker("drain worker stopped".to_string()),
                        };
                        return self.abort(None, err);
                    }
                }
                ImportMessage::Done { total_rows, .. } => {
                    self.shared.set_state(ImportState::Saving);
                    drop(batch_tx);
                    let inserted = match join_drain(drain) {
                        Ok(inserted) => inserted,
                        Err(e) => return self.abort(None, e),
                    };
                    if self.shared.cancelled() {
                        return self.abort(None, GridError::Cancelled);
                    }
                    if inserted != total_rows {
                        warn!(dataset_id, inserted, reported = total_rows, "row count mismatch");
                    }
                    return self.finish(inserted);
                }
                ImportMessage::Error { message } => {
                    drop(batch_tx);
                    return self.abort(Some(drain), GridError::Decode(message));
                }
            }
        }
    }

    /// Write the authoritative row count last, after every batch landed
    fn finish(self, inserted: u64) -> Result<Dataset> {
        match self
            .store
            .update_dataset(self.dataset.id, DatasetPatch::total_rows(inserted))
        {
            Ok(dataset) => {
                info!(dataset_id = dataset.id, rows = inserted, name = %dataset.name, "import finished");
                self.shared.set_state(ImportState::Done);
                Ok(dataset)
            }
            Err(e) => self.abort(None, e),
        }
    }

    /// Stop everything, delete the partial dataset and report `err`
    fn abort(self, drain: Option<JoinHandle<Result<u64>>>, err: GridError) -> Result<Dataset> {
        self.shared.cancel.store(true, Ordering::SeqCst);
        if let Some(drain) = drain {
            // Already failing; the drain's own outcome no longer matters
            let _ = join_drain(drain);
        }

        if let Err(cleanup) = self.store.delete_dataset_cascade(self.dataset.id) {
            error!(dataset_id = self.dataset.id, "cleanup after failed import failed: {}", cleanup);
        }

        if err.is_cancelled() {
            info!(dataset_id = self.dataset.id, "import cancelled");
            self.shared.set_state(ImportState::Idle);
        } else {
            warn!(dataset_id = self.dataset.id, "import failed: {}", err);
            self.shared.set_state(ImportState::Error(err.to_string()));
        }
        Err(err)
    }
}

/// Single in-order writer; returns the number of rows inserted
fn spawn_drain(
    store: Arc<dyn RecordStore>,
    batches: Receiver<Vec<NewRecord>>,
    cancel: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<u64>>> {
    let handle = thread::Builder::new()
        .name("atlasgrid-drain".to_string())
        .spawn(move || {
            let mut inserted = 0u64;
            for batch in batches {
                if cancel.load(Ordering::SeqCst) {
                    return Err(GridError::Cancelled);
                }
                let rows = store.bulk_insert_records(batch)?;
                inserted += rows as u64;
                debug!(rows, inserted, "batch persisted");
            }
            Ok(inserted)
        })?;
    Ok(handle)
}

fn join_drain(drain: JoinHandle<Result<u64>>) -> Result<u64> {
    drain
        .join()
        .map_err(|_| GridError::Worker("drain worker panicked".to_string()))?
}

// =============================================================================
// Handle
// =============================================================================

/// Caller's view of a running import
pub struct ImportHandle {
    dataset: Dataset,
    cancel: Arc<AtomicBool>,
    state: Arc<RwLock<ImportState>>,
    events: Receiver<ImportEvent>,
    controller: Option<JoinHandle<Result<Dataset>>>,
}

impl ImportHandle {
    pub fn dataset_id(&self) -> u64 {
        self.dataset.id
    }

    /// The dataset as created, before rows were counted
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Stop decoding and roll the dataset back
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> ImportState {
        self.state.read().clone()
    }

    /// State changes and progress, in order
    pub fn events(&self) -> &Receiver<ImportEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.controller.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the import settles
    pub fn wait(mut self) -> Result<Dataset> {
        let controller = self
            .controller
            .take()
            .ok_or_else(|| GridError::Worker("import already awaited".to_string()))?;
        controller
            .join()
            .map_err(|_| GridError::Worker("import controller panicked".to_string()))?
    }
}

/// Start importing `path` into a new dataset
///
/// The dataset row is created before this returns, so its id is known
/// while rows are still streaming in.
pub fn begin_import(
    store: Arc<dyn RecordStore>,
    path: &Path,
    config: &Config,
) -> Result<ImportHandle> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GridError::Decode(format!("cannot read {}: {}", path.display(), e)))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());

    let dataset = store.create_dataset(NewDataset {
        name,
        byte_size: metadata.len(),
    })?;
    info!(dataset_id = dataset.id, path = %path.display(), "import started");

    let (controller, cancel, state, events) =
        ImportController::new(Arc::clone(&store), dataset.clone(), config.import_queue_depth);

    let (tx, rx) = channel::bounded(config.import_queue_depth.max(1));
    let command = ImportCommand::Parse {
        path: path.to_path_buf(),
        dataset_id: dataset.id,
    };
    if let Err(e) = spawn_decode_worker(command, config.import_batch_size, Arc::clone(&cancel), tx) {
        let _ = store.delete_dataset_cascade(dataset.id);
        return Err(e);
    }

    let controller = thread::Builder::new()
        .name("atlasgrid-import".to_string())
        .spawn(move || controller.drive(rx));
    let controller = match controller {
        Ok(handle) => handle,
        Err(e) => {
            cancel.store(true, Ordering::SeqCst);
            let _ = store.delete_dataset_cascade(dataset.id);
            return Err(e.into());
        }
    };

    Ok(ImportHandle {
        dataset,
        cancel,
        state,
        events,
        controller: Some(controller),
    })
}

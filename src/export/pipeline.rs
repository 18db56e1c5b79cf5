//! Export controller
//!
//! ```text
//!   Idle ──▶ Loading ──▶ Exporting ──▶ Done ──(after export_done_reset)──▶ Idle
//!              │             │
//!              └─────────────┴──▶ Error        (cancel ──▶ Idle)
//! ```
//!
//! Loading runs on the controller thread against the record store; the
//! serialize worker only ever sees the loaded rows.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{info, warn};

use super::format::ExportFormat;
use super::loader::load_rows;
use super::worker::spawn_export_worker;
use crate::catalog::{Dataset, RecordStore};
use crate::config::Config;
use crate::error::{GridError, Result};
use crate::protocol::{ExportCommand, ExportMessage};

/// Where an export currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Loading,
    Exporting,
    Done,
    Error(String),
}

impl ExportState {
    pub fn is_active(&self) -> bool {
        matches!(self, ExportState::Loading | ExportState::Exporting)
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportState::Idle => write!(f, "idle"),
            ExportState::Loading => write!(f, "loading"),
            ExportState::Exporting => write!(f, "exporting"),
            ExportState::Done => write!(f, "done"),
            ExportState::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Observable export events
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    State(ExportState),
    /// Overall progress, 0.0 to 100.0
    Progress(f32),
}

/// A finished export, ready to be saved by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub payload: Vec<u8>,
    pub rows: usize,
}

/// Export state that reads `Done` only until the reset delay has passed
pub struct ExportStatus {
    inner: RwLock<(ExportState, Option<Instant>)>,
    reset_after: Duration,
}

impl ExportStatus {
    pub fn new(reset_after: Duration) -> Self {
        Self {
            inner: RwLock::new((ExportState::Idle, None)),
            reset_after,
        }
    }

    pub fn get(&self) -> ExportState {
        let inner = self.inner.read();
        match &inner.0 {
            ExportState::Done
                if inner.1.is_some_and(|at| at.elapsed() >= self.reset_after) =>
            {
                ExportState::Idle
            }
            state => state.clone(),
        }
    }

    fn set(&self, state: ExportState) {
        let done_at = (state == ExportState::Done).then(Instant::now);
        *self.inner.write() = (state, done_at);
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Drives one export through loading and serialization
pub struct ExportController {
    store: Arc<dyn RecordStore>,
    dataset: Dataset,
    format: ExportFormat,
    read_batch: usize,
    chunk_rows: usize,
    status: Arc<ExportStatus>,
    cancel: Arc<AtomicBool>,
    events: Sender<ExportEvent>,
}

impl ExportController {
    fn set_state(&self, state: ExportState) {
        self.status.set(state.clone());
        let _ = self.events.send(ExportEvent::State(state));
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run both phases for `ids`
    pub fn run(self, ids: Vec<i64>) -> Result<ExportArtifact> {
        self.set_state(ExportState::Loading);
        let loaded = load_rows(
            self.store.as_ref(),
            self.dataset.id,
            &ids,
            self.read_batch,
            &self.cancel,
            |percent| {
                let _ = self.events.send(ExportEvent::Progress(percent));
            },
        );
        let rows = match loaded {
            Ok(rows) => rows,
            Err(e) => return self.fail(e),
        };
        if self.cancelled() {
            return self.fail(GridError::Cancelled);
        }

        self.set_state(ExportState::Exporting);
        let row_count = rows.len();
        let filename = self.format.export_filename(&self.dataset.name, Utc::now());
        let command = ExportCommand::Export {
            format: self.format,
            rows,
            filename,
        };

        let (tx, rx) = channel::unbounded();
        if let Err(e) = spawn_export_worker(command, self.chunk_rows, Arc::clone(&self.cancel), tx) {
            return self.fail(e);
        }
        self.drive(rx, row_count)
    }

    /// Consume serialize worker messages until `Done` or `Error`
    pub fn drive(self, rx: Receiver<ExportMessage>, rows: usize) -> Result<ExportArtifact> {
        loop {
            if self.cancelled() {
                return self.fail(GridError::Cancelled);
            }
            match rx.recv() {
                Ok(ExportMessage::Progress { percent }) => {
                    let _ = self.events.send(ExportEvent::Progress(percent));
                }
                Ok(ExportMessage::Done { payload, filename }) => {
                    if self.cancelled() {
                        return self.fail(GridError::Cancelled);
                    }
                    info!(
                        dataset_id = self.dataset.id,
                        rows,
                        bytes = payload.len(),
                        filename = %filename,
                        "export finished"
                    );
                    self.set_state(ExportState::Done);
                    return Ok(ExportArtifact {
                        filename,
                        payload,
                        rows,
                    });
                }
                Ok(ExportMessage::Error { message }) => {
                    return self.fail(GridError::Serialization(message));
                }
                Err(_) => {
                    let err = if self.cancelled() {
                        GridError::Cancelled
                    } else {
                        GridError::Worker("serialize worker exited without finishing".to_string())
                    };
                    return self.fail(err);
                }
            }
        }
    }

    fn fail(self, err: GridError) -> Result<ExportArtifact> {
        self.cancel.store(true, Ordering::SeqCst);
        if err.is_cancelled() {
            info!(dataset_id = self.dataset.id, "export cancelled");
            self.set_state(ExportState::Idle);
        } else {
            warn!(dataset_id = self.dataset.id, "export failed: {}", err);
            self.set_state(ExportState::Error(err.to_string()));
        }
        Err(err)
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Caller's view of a running export
pub struct ExportHandle {
    dataset_id: u64,
    format: ExportFormat,
    cancel: Arc<AtomicBool>,
    status: Arc<ExportStatus>,
    events: Receiver<ExportEvent>,
    controller: Option<JoinHandle<Result<ExportArtifact>>>,
}

impl ExportHandle {
    pub fn dataset_id(&self) -> u64 {
        self.dataset_id
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Abandon the export; no payload is produced
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> ExportState {
        self.status.get()
    }

    pub fn events(&self) -> &Receiver<ExportEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.controller.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the export settles
    pub fn wait(mut self) -> Result<ExportArtifact> {
        let controller = self
            .controller
            .take()
            .ok_or_else(|| GridError::Worker("export already awaited".to_string()))?;
        controller
            .join()
            .map_err(|_| GridError::Worker("export controller panicked".to_string()))?
    }
}

/// Build a controller whose messages can be fed directly
///
/// Returns the controller with its handle; the handle has no thread to
/// join, so drive the controller on the calling thread.
pub fn export_controller(
    store: Arc<dyn RecordStore>,
    dataset: Dataset,
    format: ExportFormat,
    config: &Config,
) -> (ExportController, ExportHandle) {
    let (events_tx, events_rx) = channel::unbounded();
    let status = Arc::new(ExportStatus::new(config.export_done_reset));
    let cancel = Arc::new(AtomicBool::new(false));

    let handle = ExportHandle {
        dataset_id: dataset.id,
        format,
        cancel: Arc::clone(&cancel),
        status: Arc::clone(&status),
        events: events_rx,
        controller: None,
    };
    let controller = ExportController {
        store,
        dataset,
        format,
        read_batch: config.export_read_batch,
        chunk_rows: config.export_chunk_rows,
        status,
        cancel,
        events: events_tx,
    };
    (controller, handle)
}

/// Start exporting the business ids `ids` of `dataset` as `format`
pub fn begin_export(
    store: Arc<dyn RecordStore>,
    dataset: Dataset,
    ids: Vec<i64>,
    format: ExportFormat,
    config: &Config,
) -> Result<ExportHandle> {
    info!(dataset_id = dataset.id, ids = ids.len(), %format, "export started");
    let (controller, mut handle) = export_controller(store, dataset, format, config);
    let thread = thread::Builder::new()
        .name("atlasgrid-export".to_string())
        .spawn(move || controller.run(ids))?;
    handle.controller = Some(thread);
    Ok(handle)
}

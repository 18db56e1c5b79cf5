//! Scroll position memory
//!
//! The last scroll offset of each dataset is written to the preference
//! store through a [`Debouncer`], and handed back once when the dataset is
//! laid out again.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, select, Sender};
use tracing::{trace, warn};

use crate::error::{GridError, Result};
use crate::kv::KvStore;

enum Signal<T> {
    Update(T),
    Flush(Sender<()>),
    Cancel,
}

/// Timer-armed write coalescing
///
/// Every `update` re-arms one pending timer; only the timer firing (or an
/// explicit `flush`) runs the write, with the latest value. After `cancel`
/// or drop no write happens.
pub struct Debouncer<T: Send + 'static> {
    signals: Sender<Signal<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, write: F) -> Result<Self>
    where
        F: Fn(T) -> Result<()> + Send + 'static,
    {
        let (tx, rx) = channel::unbounded::<Signal<T>>();
        let thread = thread::Builder::new()
            .name("atlasgrid-debounce".to_string())
            .spawn(move || {
                let mut pending: Option<T> = None;
                let mut deadline: Option<Instant> = None;
                let fire = |value: T| {
                    if let Err(e) = write(value) {
                        warn!("debounced write failed: {}", e);
                    }
                };

                loop {
                    let timer = match deadline {
                        Some(at) => channel::at(at),
                        None => channel::never(),
                    };
                    select! {
                        recv(rx) -> signal => match signal {
                            Ok(Signal::Update(value)) => {
                                pending = Some(value);
                                deadline = Some(Instant::now() + delay);
                            }
                            Ok(Signal::Flush(ack)) => {
                                if let Some(value) = pending.take() {
                                    fire(value);
                                }
                                deadline = None;
                                let _ = ack.send(());
                            }
                            Ok(Signal::Cancel) | Err(_) => return,
                        },
                        recv(timer) -> _ => {
                            if let Some(value) = pending.take() {
                                fire(value);
                            }
                            deadline = None;
                        }
                    }
                }
            })?;

        Ok(Self {
            signals: tx,
            thread: Some(thread),
        })
    }

    /// Replace the pending value and restart the timer
    pub fn update(&self, value: T) {
        let _ = self.signals.send(Signal::Update(value));
    }

    /// Write the pending value now, returning once it is written
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.signals
            .send(Signal::Flush(ack_tx))
            .map_err(|_| GridError::Worker("debouncer stopped".to_string()))?;
        ack_rx
            .recv()
            .map_err(|_| GridError::Worker("debouncer stopped".to_string()))
    }

    /// Drop any pending value and stop the timer thread
    pub fn cancel(&mut self) {
        let _ = self.signals.send(Signal::Cancel);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

// =============================================================================
// ScrollMemory
// =============================================================================

/// Per-dataset scroll offset persistence with restore-once semantics
pub struct ScrollMemory {
    dataset_id: u64,
    saved: Option<f32>,
    restored: bool,
    user_scrolled: bool,
    debouncer: Debouncer<f32>,
}

impl ScrollMemory {
    /// Preference key holding a dataset's scroll offset
    pub fn key(dataset_id: u64) -> String {
        format!("scroll:{}", dataset_id)
    }

    pub fn new(prefs: Arc<dyn KvStore>, dataset_id: u64, delay: Duration) -> Result<Self> {
        let key = Self::key(dataset_id);
        let saved = match prefs.get(key.as_bytes())? {
            Some(bytes) => match serde_json::from_slice::<f32>(&bytes) {
                Ok(offset) if offset.is_finite() => Some(offset),
                _ => {
                    warn!(dataset_id, "ignoring unreadable scroll offset");
                    None
                }
            },
            None => None,
        };

        let debouncer = Debouncer::new(delay, move |offset: f32| {
            let bytes = serde_json::to_vec(&offset)
                .map_err(|e| GridError::Serialization(e.to_string()))?;
            prefs.put(key.as_bytes(), &bytes)?;
            trace!(key = %key, offset, "scroll offset saved");
            Ok(())
        })?;

        Ok(Self {
            dataset_id,
            saved,
            restored: false,
            user_scrolled: false,
            debouncer,
        })
    }

    /// Remember a scroll made by the user
    pub fn record_scroll(&mut self, offset: f32) {
        self.user_scrolled = true;
        self.debouncer.update(offset.max(0.0));
    }

    /// Offset to restore on first layout
    ///
    /// Yields a value at most once, and never after the user has scrolled.
    pub fn take_restore(&mut self) -> Option<f32> {
        if self.restored || self.user_scrolled {
            return None;
        }
        self.restored = true;
        self.saved
    }

    /// Write the pending offset now
    pub fn flush(&self) -> Result<()> {
        self.debouncer.flush()
    }

    /// Drop the pending write (e.g. the dataset is being deleted)
    pub fn discard(mut self) {
        self.debouncer.cancel();
    }

    pub fn dataset_id(&self) -> u64 {
        self.dataset_id
    }
}

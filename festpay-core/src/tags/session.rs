//! Continuous scanning until a usable tag is presented.
//!
//! A [`ScanSession`] runs [`TagValidator::scan`] in a background task while
//! it is open. Transient outcomes restart the scan silently, rejections are
//! surfaced to the UI and scanning continues (unless configured to stop),
//! and a success or a missing key ends the session.
//!
//! Every open bumps a generation counter. A scan finishing after the session
//! was closed or reopened sees a stale generation and is dropped, so a
//! closed session never publishes again.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use super::validator::{ScanOutcome, TagValidator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    /// Waiting for a tag. Carries the most recent rejection so the UI can
    /// tell the customer why their last tag was refused.
    Scanning {
        last_rejection: Option<ScanOutcome>,
    },
    Done(ScanOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScanSessionError {
    #[error("scan session is not open")]
    NotOpen,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// End the session on `Incompatible` / `Tampered` instead of scanning on.
    pub stop_on_rejection: bool,
}

#[derive(Default)]
struct Control {
    generation: u64,
    open: bool,
    task: Option<JoinHandle<()>>,
}

pub struct ScanSession {
    validator: Arc<TagValidator>,
    options: ScanOptions,
    state_tx: Arc<watch::Sender<ScanState>>,
    control: Arc<Mutex<Control>>,
}

impl ScanSession {
    pub fn new(validator: Arc<TagValidator>, options: ScanOptions) -> Self {
        let (state_tx, _) = watch::channel(ScanState::Idle);
        Self {
            validator,
            options,
            state_tx: Arc::new(state_tx),
            control: Arc::new(Mutex::new(Control::default())),
        }
    }

    pub fn status(&self) -> watch::Receiver<ScanState> {
        self.state_tx.subscribe()
    }

    pub fn status_stream(&self) -> WatchStream<ScanState> {
        WatchStream::new(self.state_tx.subscribe())
    }

    /// Start scanning. Reopening an open session discards its pending scan.
    pub async fn open(&self) {
        let mut control = self.control.lock().await;
        control.open = true;
        self.restart(&mut control);
        info!("Tag scan session opened");
    }

    /// Abandon the current scan and start a fresh one.
    pub async fn rescan(&self) -> Result<(), ScanSessionError> {
        let mut control = self.control.lock().await;
        if !control.open {
            return Err(ScanSessionError::NotOpen);
        }
        self.restart(&mut control);
        debug!("Tag scan restarted");
        Ok(())
    }

    pub async fn close(&self) {
        let mut control = self.control.lock().await;
        control.generation += 1;
        control.open = false;
        if let Some(task) = control.task.take() {
            task.abort();
        }
        self.state_tx.send_replace(ScanState::Idle);
        debug!("Tag scan session closed");
    }

    /// Wait for the session to finish.
    ///
    /// Returns `None` if the session is closed (or was never opened) before
    /// an outcome is reached.
    pub async fn next_outcome(&self) -> Option<ScanOutcome> {
        let mut rx = self.status();
        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                ScanState::Done(outcome) => return Some(outcome),
                ScanState::Idle => return None,
                ScanState::Scanning { .. } => {}
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    fn restart(&self, control: &mut Control) {
        control.generation += 1;
        if let Some(task) = control.task.take() {
            task.abort();
        }
        self.state_tx.send_replace(ScanState::Scanning {
            last_rejection: None,
        });
        control.task = Some(tokio::spawn(scan_loop(
            Arc::clone(&self.validator),
            self.options,
            Arc::clone(&self.state_tx),
            Arc::clone(&self.control),
            control.generation,
        )));
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Ok(mut control) = self.control.try_lock() {
            control.generation += 1;
            if let Some(task) = control.task.take() {
                task.abort();
            }
        }
    }
}

async fn scan_loop(
    validator: Arc<TagValidator>,
    options: ScanOptions,
    state_tx: Arc<watch::Sender<ScanState>>,
    control: Arc<Mutex<Control>>,
    generation: u64,
) {
    loop {
        let outcome = validator.scan().await;

        // Publish under the control lock so close() cannot interleave
        // between the generation check and the state update.
        let guard = control.lock().await;
        if guard.generation != generation || !guard.open {
            debug!(?outcome, "Discarding scan outcome of a closed session");
            return;
        }
        match outcome {
            ScanOutcome::Success(_) | ScanOutcome::NoKey => {
                info!(?outcome, "Tag scan finished");
                state_tx.send_replace(ScanState::Done(outcome));
                return;
            }
            ScanOutcome::Incompatible | ScanOutcome::Tampered => {
                info!(?outcome, "Tag rejected");
                if options.stop_on_rejection {
                    state_tx.send_replace(ScanState::Done(outcome));
                    return;
                }
                state_tx.send_replace(ScanState::Scanning {
                    last_rejection: Some(outcome),
                });
            }
            ScanOutcome::Rescan | ScanOutcome::Other(_) => {
                debug!(?outcome, "Transient scan failure, scanning again");
            }
        }
        drop(guard);
        tokio::task::yield_now().await;
    }
}

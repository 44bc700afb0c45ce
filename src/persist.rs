//! Debounced persistence hinting.
//!
//! In-memory state is always updated synchronously per event; only the
//! "please persist" signal is deferred. A dedicated worker thread coalesces
//! successive dirty signals per project into one delayed write, superseding
//! pending snapshots within the window.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use snapshot_store::SnapshotStore;

/// Delay between the first dirty signal and the write it schedules.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

enum PersistMessage {
    Dirty {
        project_id: String,
        session_id: String,
        snapshot: Value,
    },
    Flush,
    Shutdown,
}

/// Coalescing writer in front of a [`SnapshotStore`].
pub struct PersistScheduler {
    tx: Sender<PersistMessage>,
    worker: Option<JoinHandle<()>>,
}

impl PersistScheduler {
    pub fn spawn(store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_window(store, DEBOUNCE_WINDOW)
    }

    pub fn with_window(store: Arc<dyn SnapshotStore>, window: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("session-persist".to_string())
            .spawn(move || run_worker(store, rx, window));

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(error) => {
                log::error!("failed to spawn persist worker: {error}");
                None
            }
        };

        Self { tx, worker }
    }

    /// Signals that a session snapshot changed. Supersedes any pending
    /// snapshot for the same project within the debounce window.
    pub fn mark_dirty(&self, project_id: &str, session_id: &str, snapshot: Value) {
        self.send(PersistMessage::Dirty {
            project_id: project_id.to_string(),
            session_id: session_id.to_string(),
            snapshot,
        });
    }

    /// Forces pending snapshots to be written without waiting out the
    /// window. Used when a session turns terminal.
    pub fn flush(&self) {
        self.send(PersistMessage::Flush);
    }

    fn send(&self, message: PersistMessage) {
        if self.tx.send(message).is_err() {
            log::warn!("persist worker is gone; dropping persistence hint");
        }
    }
}

impl Drop for PersistScheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(PersistMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(store: Arc<dyn SnapshotStore>, rx: Receiver<PersistMessage>, window: Duration) {
    let mut pending: HashMap<String, (String, Value)> = HashMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let message = match deadline {
            Some(at) => {
                let now = Instant::now();
                if at <= now {
                    write_pending(&*store, &mut pending);
                    deadline = None;
                    continue;
                }
                match rx.recv_timeout(at - now) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        write_pending(&*store, &mut pending);
                        deadline = None;
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        match message {
            PersistMessage::Dirty {
                project_id,
                session_id,
                snapshot,
            } => {
                pending.insert(project_id, (session_id, snapshot));
                if deadline.is_none() {
                    deadline = Some(Instant::now() + window);
                }
            }
            PersistMessage::Flush => {
                write_pending(&*store, &mut pending);
                deadline = None;
            }
            PersistMessage::Shutdown => break,
        }
    }

    // Drain whatever is still pending before exiting.
    write_pending(&*store, &mut pending);
}

fn write_pending(store: &dyn SnapshotStore, pending: &mut HashMap<String, (String, Value)>) {
    for (project_id, (session_id, snapshot)) in pending.drain() {
        store.upsert(&project_id, &session_id, &snapshot);
    }
}

use std::sync::{Arc, Mutex, MutexGuard};

use agent_stream::SseDecoder;
use generation_session::{GenerationSession, SessionSeed};
use serde_json::Value;
use snapshot_store::{hydrate, hydrate_project, SnapshotError, SnapshotStore};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::archive::HistoryArchive;
use crate::guard::{GenerationGuard, GenerationToken};
use crate::persist::PersistScheduler;
use crate::reducer::SessionReducer;
use crate::sync::{self, SnapshotApplied};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a generation is already in progress for this project")]
    GenerationInProgress,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Result of a hydration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    /// A build is streaming; hydration was skipped entirely rather than
    /// queued, so in-flight state is never clobbered by stale storage.
    SkippedGenerating,
    Hydrated {
        has_current: bool,
        archived: usize,
    },
}

struct EngineState {
    reducer: SessionReducer,
    archive: HistoryArchive,
}

/// Single owner of session state for one project.
///
/// Two independent writers mutate it: the decode loop (via
/// [`GenerationHandle`]) and out-of-band snapshot pushes (via
/// [`SessionEngine::apply_remote_snapshot`]). Both serialize through one
/// mutex; in-memory updates are synchronous and only the persistence hint
/// is debounced.
pub struct SessionEngine {
    state: Mutex<EngineState>,
    guard: GenerationGuard,
    store: Arc<dyn SnapshotStore>,
    scheduler: PersistScheduler,
}

impl SessionEngine {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        let scheduler = PersistScheduler::spawn(Arc::clone(&store));
        Self::with_scheduler(store, scheduler)
    }

    /// Engine with a custom debounce window, for tests and embedders that
    /// need tighter persistence latency.
    pub fn with_debounce_window(store: Arc<dyn SnapshotStore>, window: std::time::Duration) -> Self {
        let scheduler = PersistScheduler::with_window(Arc::clone(&store), window);
        Self::with_scheduler(store, scheduler)
    }

    fn with_scheduler(store: Arc<dyn SnapshotStore>, scheduler: PersistScheduler) -> Self {
        Self {
            state: Mutex::new(EngineState {
                reducer: SessionReducer::new(),
                archive: HistoryArchive::new(),
            }),
            guard: GenerationGuard::new(),
            store,
            scheduler,
        }
    }

    #[must_use]
    pub fn guard(&self) -> &GenerationGuard {
        &self.guard
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.guard.is_generating()
    }

    /// Starts a build: raises the generation flag and materializes the
    /// fresh session before any network confirmation, so the UI boundary
    /// never observes a null state during an in-flight build.
    pub fn begin_generation(&self, seed: SessionSeed) -> Result<GenerationHandle<'_>, EngineError> {
        let token = self
            .guard
            .try_acquire()
            .ok_or(EngineError::GenerationInProgress)?;

        let session_id = seed
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session =
            GenerationSession::new_pending(&session_id, &seed, OffsetDateTime::now_utc());

        {
            let mut state = self.lock_state();
            if let Some(previous) = state.reducer.take_session() {
                state.archive.insert_newest(previous);
            }
            state.reducer.set_session(Some(session));
        }
        self.hint_persist();

        Ok(GenerationHandle {
            engine: self,
            decoder: SseDecoder::default(),
            token: Some(token),
            finalized: false,
        })
    }

    /// Applies an authoritative snapshot pushed over the out-of-band
    /// channel. The payload is hydrated through the same validation path as
    /// persisted records.
    pub fn apply_remote_snapshot(&self, raw: &Value) -> Result<SnapshotApplied, EngineError> {
        let incoming = hydrate(raw)?;

        let applied = {
            let mut state = self.lock_state();
            let superseded = match state.reducer.session() {
                Some(local) if local.id != incoming.id && !local.is_active => Some(local.clone()),
                _ => None,
            };
            let applied = sync::apply_snapshot(state.reducer.session_slot_mut(), incoming);
            if let Some(previous) = superseded {
                state.archive.insert_newest(previous);
            }
            applied
        };

        self.hint_persist();
        Ok(applied)
    }

    /// Rebuilds state from the persistence collaborator, e.g. after a
    /// reload or project switch. Skipped outright while a build streams.
    pub fn hydrate_project(&self, project_id: &str) -> Result<HydrateOutcome, EngineError> {
        if self.guard.is_generating() {
            log::info!("skipping hydration for '{project_id}': generation in progress");
            return Ok(HydrateOutcome::SkippedGenerating);
        }

        let stored = self.store.load(project_id)?;
        let records: Vec<Value> = stored.into_iter().map(|session| session.snapshot).collect();
        let hydration = hydrate_project(&records);

        let mut state = self.lock_state();
        // Re-checked under the state lock: a build requested after the
        // check above has already raised the flag before touching state.
        if self.guard.is_generating() {
            log::info!("skipping hydration for '{project_id}': generation started mid-load");
            return Ok(HydrateOutcome::SkippedGenerating);
        }

        let has_current = hydration.current.is_some();
        state.reducer.set_session(hydration.current);
        let mut archive = HistoryArchive::new();
        for session in hydration.history {
            archive.insert(session);
        }
        let archived = archive.len();
        state.archive = archive;

        Ok(HydrateOutcome::Hydrated {
            has_current,
            archived,
        })
    }

    #[must_use]
    pub fn current_session(&self) -> Option<GenerationSession> {
        self.lock_state().reducer.session().cloned()
    }

    #[must_use]
    pub fn history(&self) -> Vec<GenerationSession> {
        self.lock_state().archive.sessions().to_vec()
    }

    /// Reply text of the current message envelope, for the chat boundary.
    #[must_use]
    pub fn reply_text(&self) -> String {
        self.lock_state().reducer.reply_text().to_string()
    }

    /// Thread id captured by the current session, used to seed a follow-up
    /// build that resumes the same agent thread.
    #[must_use]
    pub fn resume_thread_id(&self) -> Option<String> {
        self.lock_state()
            .reducer
            .session()
            .and_then(|session| session.codex.as_ref())
            .and_then(|codex| codex.thread_id.clone())
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock_unpoisoned(&self.state)
    }

    fn hint_persist(&self) {
        let hint = {
            let state = self.lock_state();
            state.reducer.session().map(|session| {
                (
                    session.project_id.clone(),
                    session.id.clone(),
                    serde_json::to_value(session),
                )
            })
        };

        let Some((project_id, session_id, snapshot)) = hint else {
            return;
        };
        match snapshot {
            Ok(snapshot) => self.scheduler.mark_dirty(&project_id, &session_id, snapshot),
            Err(error) => log::warn!("failed to serialize session snapshot: {error}"),
        }
    }
}

/// Driver for one build's decode loop. Owns the wire decoder and the
/// generation token; the token is released on every exit path, including
/// dropping the handle after a transport failure.
pub struct GenerationHandle<'a> {
    engine: &'a SessionEngine,
    decoder: SseDecoder,
    token: Option<GenerationToken>,
    finalized: bool,
}

impl GenerationHandle<'_> {
    /// Feeds raw bytes from the stream. Decoded events update in-memory
    /// state synchronously; the persistence hint is debounced.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.finalized {
            return;
        }

        let events = self.decoder.feed(bytes);
        if !events.is_empty() {
            let mut state = self.engine.lock_state();
            for event in &events {
                state.reducer.apply(event);
            }
            drop(state);
            self.engine.hint_persist();
        }

        if self.decoder.is_done() {
            self.finalize();
        }
    }

    /// Ends the stream: flushes any buffered partial frame, runs the
    /// finalization sequence, and persists the terminal state immediately.
    pub fn finish(mut self) {
        self.finalize();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finalized
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let flushed = self.decoder.finish();
        {
            let mut state = self.engine.lock_state();
            for event in &flushed {
                state.reducer.apply(event);
            }
            state.reducer.finish_stream();
        }

        self.engine.hint_persist();
        self.engine.scheduler.flush();
        self.token.take();
    }
}

impl Drop for GenerationHandle<'_> {
    fn drop(&mut self) {
        // An abruptly dying transport still finalizes the session.
        self.finalize();
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

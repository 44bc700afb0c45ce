use std::collections::HashSet;

use generation_session::GenerationSession;

/// Per-project history of completed sessions, deduplicated by session id
/// and kept newest-first. Archived sessions are never mutated.
#[derive(Debug, Default)]
pub struct HistoryArchive {
    sessions: Vec<GenerationSession>,
    ids: HashSet<String>,
}

impl HistoryArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed session. Rejects still-active sessions and ids
    /// already present; returns whether the session was inserted.
    pub fn insert(&mut self, session: GenerationSession) -> bool {
        if !self.admit(&session) {
            return false;
        }
        self.ids.insert(session.id.clone());
        self.sessions.push(session);
        true
    }

    /// Inserts a freshly completed session at the newest position.
    pub fn insert_newest(&mut self, session: GenerationSession) -> bool {
        if !self.admit(&session) {
            return false;
        }
        self.ids.insert(session.id.clone());
        self.sessions.insert(0, session);
        true
    }

    fn admit(&self, session: &GenerationSession) -> bool {
        if session.is_active {
            log::debug!("refusing to archive still-active session '{}'", session.id);
            return false;
        }
        !self.ids.contains(&session.id)
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.ids.contains(session_id)
    }

    #[must_use]
    pub fn sessions(&self) -> &[GenerationSession] {
        &self.sessions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SnapshotError;
use crate::paths::project_file_path;

/// Lightweight metadata carried alongside each persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSessionMeta {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub is_active: bool,
}

/// One persisted session: the full snapshot plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub meta: StoredSessionMeta,
    pub snapshot: Value,
}

impl StoredSession {
    /// Derives metadata from the snapshot itself.
    #[must_use]
    pub fn from_snapshot(snapshot: Value) -> Self {
        let meta = StoredSessionMeta {
            session_id: snapshot
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            started_at: snapshot
                .get("startTime")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            is_active: snapshot
                .get("isActive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        Self { meta, snapshot }
    }
}

/// Key-value persistence collaborator, keyed by project id.
///
/// `upsert` is fire-and-forget: implementations log failures instead of
/// returning them, and callers never block on confirmation or retry.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, project_id: &str) -> Result<Vec<StoredSession>, SnapshotError>;
    fn upsert(&self, project_id: &str, session_id: &str, snapshot: &Value);
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<HashMap<String, Vec<StoredSession>>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a snapshot directly, bypassing the upsert path.
    pub fn seed(&self, project_id: &str, snapshot: Value) {
        let mut inner = lock_unpoisoned(&self.inner);
        inner
            .entry(project_id.to_string())
            .or_default()
            .push(StoredSession::from_snapshot(snapshot));
    }

    /// Number of upserts observed for a project, for assertions.
    #[must_use]
    pub fn session_count(&self, project_id: &str) -> usize {
        lock_unpoisoned(&self.inner)
            .get(project_id)
            .map_or(0, Vec::len)
    }

    #[must_use]
    pub fn latest_snapshot(&self, project_id: &str, session_id: &str) -> Option<Value> {
        lock_unpoisoned(&self.inner)
            .get(project_id)
            .and_then(|sessions| {
                sessions
                    .iter()
                    .rev()
                    .find(|session| session.meta.session_id == session_id)
            })
            .map(|session| session.snapshot.clone())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, project_id: &str) -> Result<Vec<StoredSession>, SnapshotError> {
        Ok(lock_unpoisoned(&self.inner)
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    fn upsert(&self, project_id: &str, session_id: &str, snapshot: &Value) {
        let mut inner = lock_unpoisoned(&self.inner);
        let sessions = inner.entry(project_id.to_string()).or_default();
        let stored = StoredSession::from_snapshot(snapshot.clone());
        match sessions
            .iter_mut()
            .find(|session| session.meta.session_id == session_id)
        {
            Some(existing) => *existing = stored,
            None => sessions.push(stored),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    version: u32,
    project_id: String,
    sessions: Vec<Value>,
}

/// File-backed store: one JSON document per project under a root directory.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_project_file(&self, project_id: &str) -> Result<Vec<Value>, SnapshotError> {
        let path = project_file_path(&self.root, project_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(SnapshotError::io("reading project snapshots", &path, error));
            }
        };

        let file: ProjectFile =
            serde_json::from_str(&raw).map_err(|source| SnapshotError::json_parse(&path, source))?;
        if file.version != 1 {
            return Err(SnapshotError::UnsupportedVersion {
                path,
                found: file.version,
            });
        }

        Ok(file.sessions)
    }

    /// Fallible upsert used by `SnapshotStore::upsert`; exposed so tests can
    /// assert on failure modes.
    pub fn try_upsert(
        &self,
        project_id: &str,
        session_id: &str,
        snapshot: &Value,
    ) -> Result<(), SnapshotError> {
        let mut sessions = self.read_project_file(project_id)?;

        let slot = sessions
            .iter_mut()
            .find(|existing| existing.get("id").and_then(Value::as_str) == Some(session_id));
        match slot {
            Some(existing) => *existing = snapshot.clone(),
            None => sessions.push(snapshot.clone()),
        }

        let file = ProjectFile {
            version: 1,
            project_id: project_id.to_string(),
            sessions,
        };
        let serialized =
            serde_json::to_string(&file).map_err(|source| SnapshotError::JsonSerialize {
                project_id: project_id.to_string(),
                source,
            })?;

        std::fs::create_dir_all(&self.root)
            .map_err(|source| SnapshotError::io("creating snapshot root", &self.root, source))?;
        let path = project_file_path(&self.root, project_id);
        std::fs::write(&path, serialized)
            .map_err(|source| SnapshotError::io("writing project snapshots", &path, source))
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self, project_id: &str) -> Result<Vec<StoredSession>, SnapshotError> {
        Ok(self
            .read_project_file(project_id)?
            .into_iter()
            .map(StoredSession::from_snapshot)
            .collect())
    }

    fn upsert(&self, project_id: &str, session_id: &str, snapshot: &Value) {
        if let Err(error) = self.try_upsert(project_id, session_id, snapshot) {
            log::warn!("failed to persist snapshot for project '{project_id}': {error}");
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

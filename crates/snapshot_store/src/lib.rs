mod error;
mod hydrate;
mod paths;
mod schema;
mod store;

pub use error::SnapshotError;
pub use hydrate::{hydrate, hydrate_project, ProjectHydration};
pub use paths::{project_file_name, project_file_path, sanitize_project_id};
pub use store::{JsonFileStore, MemorySnapshotStore, SnapshotStore, StoredSession, StoredSessionMeta};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot record has invalid structure: {source}")]
    Structure {
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot record is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse snapshot file {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot file {path} has unsupported version {found}; expected 1")]
    UnsupportedVersion { path: PathBuf, found: u32 },

    #[error("failed to serialize snapshot for project '{project_id}': {source}")]
    JsonSerialize {
        project_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    #[must_use]
    pub fn structure(source: serde_json::Error) -> Self {
        Self::Structure { source }
    }

    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            path: path.into(),
            source,
        }
    }
}

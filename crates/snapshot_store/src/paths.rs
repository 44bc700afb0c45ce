use std::path::{Path, PathBuf};

#[must_use]
pub fn sanitize_project_id(project_id: &str) -> String {
    project_id
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' | '.' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn project_file_name(project_id: &str) -> String {
    format!("{}.json", sanitize_project_id(project_id))
}

#[must_use]
pub fn project_file_path(root: &Path, project_id: &str) -> PathBuf {
    root.join(project_file_name(project_id))
}

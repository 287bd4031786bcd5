//! Workspace-relative path resolution for project working trees.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::CliTool;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("invalid project guid '{0}': must be a single non-empty path segment")]
    InvalidProjectGuid(String),

    #[error("failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Root directory holding one working tree per project GUID.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the workspace root if missing. Idempotent.
    pub fn ensure(&self) -> Result<(), WorkspaceError> {
        std::fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::Create {
            path: self.root.clone(),
            source,
        })?;
        debug!(root = %self.root.display(), "workspace ready");
        Ok(())
    }

    /// `<workspace>/<project_guid>`; the empty GUID resolves to the root.
    pub fn project_path(&self, project_guid: &str) -> PathBuf {
        if project_guid.is_empty() {
            self.root.clone()
        } else {
            self.root.join(project_guid)
        }
    }

    pub fn project_exists(&self, project_guid: &str) -> bool {
        !project_guid.is_empty() && self.project_path(project_guid).is_dir()
    }

    /// Whether `<project>/<relative>` exists as a directory.
    pub fn has_dir(&self, project_guid: &str, relative: impl AsRef<Path>) -> bool {
        self.project_path(project_guid).join(relative).is_dir()
    }

    /// Whether `<project>/<relative>` exists as a file.
    pub fn has_file(&self, project_guid: &str, relative: impl AsRef<Path>) -> bool {
        self.project_path(project_guid).join(relative).is_file()
    }

    /// First assistant whose marker directory exists in the project.
    pub fn installed_cli_tool(&self, project_guid: &str) -> Option<CliTool> {
        CliTool::ALL
            .into_iter()
            .find(|tool| self.has_dir(project_guid, tool.marker_dir()))
    }

    /// Like [`installed_cli_tool`](Self::installed_cli_tool) but falls back
    /// to the default assistant.
    pub fn detect_cli_tool(&self, project_guid: &str) -> CliTool {
        self.installed_cli_tool(project_guid).unwrap_or_default()
    }
}

/// Reject GUIDs that would escape the workspace or address its root.
pub fn validate_project_guid(project_guid: &str) -> Result<(), WorkspaceError> {
    let trimmed = project_guid.trim();
    let bad = trimmed.is_empty()
        || trimmed != project_guid
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0']);
    if bad {
        return Err(WorkspaceError::InvalidProjectGuid(project_guid.to_string()));
    }
    Ok(())
}

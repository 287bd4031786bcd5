use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use am_core::workspace::Workspace;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::shell::{ExecResult, ShellError, ShellSession, ShellSpec};

/// Default bound of each session's request channel.
const DEFAULT_REQUEST_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// CommandExecutor trait
// ---------------------------------------------------------------------------

/// Process execution against project working trees.
///
/// Pipelines depend on this trait rather than on [`SessionManager`] so they
/// can be driven by scripted executors in tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a shell command in the project's session. An empty
    /// `project_guid` targets the workspace root.
    async fn execute(&self, project_guid: &str, command: &str, timeout: Duration) -> ExecResult;

    /// Run `program` with `args` directly, without a shell, inside
    /// `<workspace>/<sub_path>`. The process is killed on timeout.
    async fn simple_execute(
        &self,
        sub_path: &str,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> ExecResult;
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

type SessionSlot = Arc<Mutex<Option<Arc<ShellSession>>>>;

/// Owns one [`ShellSession`] per project, created lazily.
///
/// Lookup goes through a concurrent map; creation is serialized per key so
/// concurrent first calls for a project yield a single session. A closed
/// session (timeout, crash, cleanup) is replaced on the next call and a
/// failed spawn leaves the slot empty for the next attempt.
pub struct SessionManager {
    workspace: Workspace,
    spec: ShellSpec,
    capacity: usize,
    sessions: DashMap<String, SessionSlot>,
}

impl SessionManager {
    pub fn new(workspace: Workspace) -> Self {
        Self::with_shell(workspace, ShellSpec::platform_default(), DEFAULT_REQUEST_CAPACITY)
    }

    pub fn with_shell(workspace: Workspace, spec: ShellSpec, capacity: usize) -> Self {
        Self {
            workspace,
            spec,
            capacity,
            sessions: DashMap::new(),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The live session for `project_guid`, starting one if needed.
    pub async fn session(&self, project_guid: &str) -> Result<Arc<ShellSession>, ShellError> {
        let slot = self
            .sessions
            .entry(project_guid.to_string())
            .or_default()
            .clone();

        let mut current = slot.lock().await;
        if let Some(session) = current.as_ref() {
            if !session.is_closed() {
                return Ok(session.clone());
            }
            info!(project_guid, "replacing closed shell session");
        }

        let cwd = self.workspace.project_path(project_guid);
        let session = match ShellSession::spawn(project_guid, &cwd, &self.spec, self.capacity) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                warn!(project_guid, error = %e, "failed to start shell session");
                *current = None;
                return Err(e);
            }
        };
        *current = Some(session.clone());
        Ok(session)
    }

    /// Number of projects with a live session.
    pub fn session_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| match entry.value().try_lock() {
                Ok(slot) => slot.as_ref().is_some_and(|s| !s.is_closed()),
                // Locked means a creation is in progress.
                Err(_) => true,
            })
            .count()
    }

    /// Kill and forget the session of one project.
    pub async fn remove(&self, project_guid: &str) {
        if let Some((_, slot)) = self.sessions.remove(project_guid) {
            if let Some(session) = slot.lock().await.take() {
                session.cleanup();
            }
        }
    }

    /// Kill every session. Used on shutdown.
    pub async fn cleanup_all(&self) {
        let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.remove(&key).await;
        }
        info!("all shell sessions cleaned up");
    }
}

#[async_trait]
impl CommandExecutor for SessionManager {
    async fn execute(&self, project_guid: &str, command: &str, timeout: Duration) -> ExecResult {
        let session = match self.session(project_guid).await {
            Ok(s) => s,
            Err(e) => return ExecResult::failed(e),
        };
        let result = session.execute(command, timeout).await;
        debug!(
            project_guid,
            command,
            success = result.success,
            exit_code = ?result.exit_code,
            "shell command finished"
        );
        result
    }

    async fn simple_execute(
        &self,
        sub_path: &str,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> ExecResult {
        let cwd = self.workspace.project_path(sub_path);
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(program, cwd = %cwd.display(), argc = args.len(), "spawning process");
        match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => {
                warn!(program, ?timeout, "process timed out and was killed");
                ExecResult::failed(ShellError::Timeout(timeout))
            }
            Ok(Err(source)) => ExecResult::failed(ShellError::Spawn {
                program: program.to_string(),
                cwd,
                source,
            }),
            Ok(Ok(output)) => ExecResult::completed(
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stdout).trim(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ),
        }
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use am_bridge::reporter::TaskReporter;
use am_core::session_store::SessionIdStore;
use am_core::types::{AgentExecutePayload, CliTool};
use am_core::workspace::{validate_project_guid, Workspace, WorkspaceError};
use am_session::cli_adapter::{adapter_for, ResultEnvelope};
use am_session::manager::CommandExecutor;
use thiserror::Error;
use tracing::{info, warn};

use crate::vcs::{CommitOutcome, GitHelper, VcsError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The assistant process could not run or exited non-zero.
    #[error("{0}")]
    Execution(String),

    /// The assistant ran but flagged its own result as an error. Displays
    /// the result text unchanged so subscribers see the assistant's words.
    #[error("{0}")]
    Assistant(String),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ---------------------------------------------------------------------------
// AgentPipeline
// ---------------------------------------------------------------------------

/// Runs one assistant turn against a project and persists what it wrote.
///
/// The turn itself is argv-level: the message is handed to the assistant
/// binary as a single argument, never through the project shell.
pub struct AgentPipeline {
    executor: Arc<dyn CommandExecutor>,
    workspace: Workspace,
    sessions: SessionIdStore,
    git: GitHelper,
    fallback_tool: CliTool,
    timeout: Duration,
}

impl AgentPipeline {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        workspace: Workspace,
        sessions: SessionIdStore,
        git: GitHelper,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            workspace,
            sessions,
            git,
            fallback_tool: CliTool::default(),
            timeout,
        }
    }

    /// Assistant used when a request names none and the project carries no
    /// marker directory.
    pub fn with_fallback_tool(mut self, tool: CliTool) -> Self {
        self.fallback_tool = tool;
        self
    }

    /// Explicit tool wins, then the project's marker directory.
    pub fn resolve_tool(&self, req: &AgentExecutePayload) -> CliTool {
        req.cli_tool.unwrap_or_else(|| {
            self.workspace
                .installed_cli_tool(&req.project_guid)
                .unwrap_or(self.fallback_tool)
        })
    }

    /// Run the assistant once and return its envelope.
    ///
    /// Continues the stored conversation for the (project, role) pair and
    /// saves the id the assistant returns. Publishes nothing and commits
    /// nothing.
    pub async fn turn(&self, req: &AgentExecutePayload) -> Result<ResultEnvelope> {
        validate_project_guid(&req.project_guid)?;
        let tool = self.resolve_tool(req);
        let adapter = adapter_for(tool);
        let session_id = self.sessions.get(&req.project_guid, req.agent_role).await;
        let args = adapter.argv(&session_id, &req.message);

        info!(
            project_guid = %req.project_guid,
            role = %req.agent_role,
            cli_tool = %tool,
            resume = !session_id.is_empty(),
            "running assistant turn"
        );

        let started = Instant::now();
        let output = self
            .executor
            .simple_execute(&req.project_guid, adapter.binary(), &args, self.timeout)
            .await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if !output.success {
            let message = output.failure_message();
            warn!(project_guid = %req.project_guid, cli_tool = %tool, error = %message, "assistant turn failed");
            return Err(PipelineError::Execution(message));
        }

        let mut envelope = match adapter.parse_result(&output.stdout) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(cli_tool = %tool, error = %e, "treating assistant output as plain text");
                ResultEnvelope::plain(output.stdout.trim())
            }
        };
        if envelope.duration_ms == 0 {
            envelope.duration_ms = elapsed_ms;
        }

        if envelope.is_error {
            return Err(PipelineError::Assistant(envelope.result));
        }

        if !envelope.session_id.is_empty() {
            self.sessions
                .save(&req.project_guid, req.agent_role, &envelope.session_id)
                .await;
        }
        Ok(envelope)
    }

    /// Full agent task: report start, run the turn, commit and push the
    /// result, then report the terminal status.
    pub async fn execute(
        &self,
        req: &AgentExecutePayload,
        reporter: &TaskReporter,
    ) -> Result<ResultEnvelope> {
        reporter.started("task started").await;
        match self.turn_and_commit(req, reporter).await {
            Ok(envelope) => {
                reporter.done(&envelope.result).await;
                Ok(envelope)
            }
            Err(e) => {
                reporter.failed(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn turn_and_commit(
        &self,
        req: &AgentExecutePayload,
        reporter: &TaskReporter,
    ) -> Result<ResultEnvelope> {
        let envelope = self.turn(req).await?;
        reporter.progress(80, "committing changes").await;
        self.commit(&req.project_guid, &envelope).await?;
        Ok(envelope)
    }

    /// Commit and push whatever the turn changed, using its result as the
    /// commit message.
    pub async fn commit(&self, project_guid: &str, envelope: &ResultEnvelope) -> Result<CommitOutcome> {
        let outcome = self
            .git
            .commit_and_push(project_guid, &envelope.result)
            .await?;
        if let CommitOutcome::Pushed { branch } = outcome {
            info!(project_guid, branch, "assistant changes pushed");
        }
        Ok(outcome)
    }
}

use std::sync::Arc;
use std::time::Duration;

use am_bridge::prompts;
use am_bridge::reporter::TaskReporter;
use am_core::config::DeployConfig;
use am_core::types::{AgentExecutePayload, AgentRole, DeployPayload, DevStage};
use am_core::workspace::{validate_project_guid, WorkspaceError};
use am_session::manager::CommandExecutor;
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::{AgentPipeline, PipelineError};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// The step failed and the assistant could not repair it.
    #[error("`{command}` failed ({message}) and repair failed: {source}")]
    Repair {
        command: String,
        message: String,
        #[source]
        source: PipelineError,
    },
}

pub type Result<T> = std::result::Result<T, DeployError>;

/// Builds and runs a project in its shell session.
///
/// A failing step is handed to the developer role with the command and its
/// error output; the assistant is expected to fix the tree and re-run the
/// step itself, so its result stands in for the step's output.
pub struct DeployPipeline {
    executor: Arc<dyn CommandExecutor>,
    agents: Arc<AgentPipeline>,
    build_command: String,
    run_command: String,
    timeout: Duration,
}

impl DeployPipeline {
    pub fn new(executor: Arc<dyn CommandExecutor>, agents: Arc<AgentPipeline>, config: &DeployConfig) -> Self {
        Self {
            executor,
            agents,
            build_command: config.build_command.clone(),
            run_command: config.run_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub async fn run(&self, payload: &DeployPayload, reporter: &TaskReporter) -> Result<String> {
        reporter
            .started(&format!("deploying to {}", payload.environment))
            .await;
        match self.steps(payload, reporter).await {
            Ok(output) => {
                let message = if output.trim().is_empty() {
                    "deploy finished".to_string()
                } else {
                    output
                };
                reporter.done(&message).await;
                Ok(message)
            }
            Err(e) => {
                reporter.failed(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn steps(&self, payload: &DeployPayload, reporter: &TaskReporter) -> Result<String> {
        let guid = payload.project_guid.as_str();
        validate_project_guid(guid)?;

        let built = self.step(guid, &self.build_command).await?;
        reporter.progress(50, "build finished").await;
        info!(project_guid = guid, bytes = built.len(), "build step done");

        let ran = self.step(guid, &self.run_command).await?;
        info!(project_guid = guid, "run step done");
        Ok(ran)
    }

    /// Run one command, falling back to an assistant repair turn.
    async fn step(&self, guid: &str, command: &str) -> Result<String> {
        let out = self.executor.execute(guid, command, self.timeout).await;
        if out.success {
            return Ok(out.stdout.trim().to_string());
        }

        let message = out.failure_message();
        warn!(project_guid = guid, command, error = %message, "deploy step failed, asking the assistant to repair");
        let repair = AgentExecutePayload {
            project_guid: guid.to_string(),
            agent_role: AgentRole::Dev,
            message: prompts::deploy_repair(command, &message),
            dev_stage: DevStage::Deploy,
            cli_tool: None,
        };

        let repaired = async {
            let envelope = self.agents.turn(&repair).await?;
            self.agents.commit(guid, &envelope).await?;
            Ok::<_, PipelineError>(envelope)
        }
        .await
        .map_err(|source| DeployError::Repair {
            command: command.to_string(),
            message,
            source,
        })?;
        Ok(repaired.result)
    }
}

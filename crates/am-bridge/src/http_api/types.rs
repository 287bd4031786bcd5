use am_core::types::{AgentRole, CliTool, DevStage};
use am_core::workspace::validate_project_guid;
use serde::{Deserialize, Serialize};

use crate::api_error::ApiError;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Request-level checks run after JSON decoding.
pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn require_guid(project_guid: &str) -> Result<(), ApiError> {
    require("projectGuid", project_guid)?;
    validate_project_guid(project_guid).map_err(|e| ApiError::Validation(e.to_string()))
}

// ---------------------------------------------------------------------------
// Agent requests
// ---------------------------------------------------------------------------

/// Body of `/agent/analyse/project-brief` and `/agent/pm/prd`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    pub requirements: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for RequirementsReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("requirements", &self.requirements)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UxStandardReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    pub requirements: String,
    #[serde(alias = "prd_path")]
    pub prd_path: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for UxStandardReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("prdPath", &self.prd_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "prd_path")]
    pub prd_path: String,
    #[serde(alias = "ux_spec_path")]
    pub ux_spec_path: String,
    #[serde(default, alias = "template_arch_description")]
    pub template_arch_description: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for ArchitectReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("prdPath", &self.prd_path)?;
        require("uxSpecPath", &self.ux_spec_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "prd_path")]
    pub prd_path: String,
    #[serde(alias = "arch_folder")]
    pub arch_folder: String,
    #[serde(alias = "stories_folder")]
    pub stories_folder: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for DatabaseReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("prdPath", &self.prd_path)?;
        require("archFolder", &self.arch_folder)?;
        require("storiesFolder", &self.stories_folder)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDefinitionReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "prd_path")]
    pub prd_path: String,
    #[serde(alias = "db_folder")]
    pub db_folder: String,
    #[serde(alias = "stories_folder")]
    pub stories_folder: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for ApiDefinitionReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("prdPath", &self.prd_path)?;
        require("dbFolder", &self.db_folder)?;
        require("storiesFolder", &self.stories_folder)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicsAndStoriesReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "prd_path")]
    pub prd_path: String,
    #[serde(alias = "arch_folder")]
    pub arch_folder: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for EpicsAndStoriesReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("prdPath", &self.prd_path)?;
        require("archFolder", &self.arch_folder)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplStoryReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "prd_path")]
    pub prd_path: String,
    #[serde(alias = "arch_folder")]
    pub arch_folder: String,
    #[serde(alias = "db_folder")]
    pub db_folder: String,
    #[serde(alias = "api_folder")]
    pub api_folder: String,
    #[serde(alias = "ux_spec_path")]
    pub ux_spec_path: String,
    #[serde(alias = "epic_file")]
    pub epic_file: String,
    #[serde(default, alias = "story_file")]
    pub story_file: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for ImplStoryReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("epicFile", &self.epic_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixBugReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "bug_description")]
    pub bug_description: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for FixBugReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("bugDescription", &self.bug_description)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTestReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for RunTestReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReq {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "agent_role", alias = "agentType", alias = "agent_type")]
    pub agent_role: AgentRole,
    pub message: String,
    #[serde(default, alias = "dev_stage")]
    pub dev_stage: Option<DevStage>,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

impl Validate for ChatReq {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("message", &self.message)
    }
}

// ---------------------------------------------------------------------------
// Project requests
// ---------------------------------------------------------------------------

impl Validate for am_core::types::SetupPayload {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)?;
        require("repoUrl", &self.repo_url)
    }
}

impl Validate for am_core::types::DeployPayload {
    fn validate(&self) -> Result<(), ApiError> {
        require_guid(&self.project_guid)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// `data` of `GET /tasks/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub task_id: String,
    pub kind: am_core::types::TaskKind,
    pub queue: am_harness::task::QueueName,
    pub state: am_harness::task::TaskState,
    pub status: am_core::types::TaskStatus,
    pub progress: u8,
    pub message: String,
    pub retried: u32,
    pub max_retry: u32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolVersion {
    pub name: String,
    pub version: String,
}

/// `data` of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub tools: Vec<ToolVersion>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AgentRole
// ---------------------------------------------------------------------------

/// The persona an assistant turn is executed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Analyst,
    Pm,
    UxExpert,
    Architect,
    Po,
    Dev,
}

impl AgentRole {
    pub const ALL: [AgentRole; 6] = [
        AgentRole::Analyst,
        AgentRole::Pm,
        AgentRole::UxExpert,
        AgentRole::Architect,
        AgentRole::Po,
        AgentRole::Dev,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Analyst => "analyst",
            AgentRole::Pm => "pm",
            AgentRole::UxExpert => "ux-expert",
            AgentRole::Architect => "architect",
            AgentRole::Po => "po",
            AgentRole::Dev => "dev",
        }
    }

    /// Stage tag used when a request does not name one explicitly.
    pub fn default_dev_stage(&self) -> DevStage {
        match self {
            AgentRole::Analyst => DevStage::CheckRequirement,
            AgentRole::Pm => DevStage::GeneratePrd,
            AgentRole::UxExpert => DevStage::DefineUxStandard,
            AgentRole::Architect => DevStage::DesignArchitecture,
            AgentRole::Po => DevStage::PlanEpicAndStory,
            AgentRole::Dev => DevStage::DevelopStory,
        }
    }

    /// Prompt directive that loads the role's installed template.
    pub fn directive(&self) -> String {
        format!("@bmad/{}.mdc", self.as_str())
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("agent role", s))
    }
}

// ---------------------------------------------------------------------------
// CliTool
// ---------------------------------------------------------------------------

/// The external coding assistant a project is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CliTool {
    #[default]
    #[serde(rename = "claude-code", alias = "claude")]
    ClaudeCode,
    #[serde(rename = "qwen-code", alias = "qwen")]
    QwenCode,
    #[serde(rename = "gemini")]
    Gemini,
}

impl CliTool {
    /// Detection order used when probing a project for marker directories.
    pub const ALL: [CliTool; 3] = [CliTool::ClaudeCode, CliTool::QwenCode, CliTool::Gemini];

    /// Identifier understood by the toolchain installer (`-i <id>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CliTool::ClaudeCode => "claude-code",
            CliTool::QwenCode => "qwen-code",
            CliTool::Gemini => "gemini",
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            CliTool::ClaudeCode => "claude",
            CliTool::QwenCode => "qwen",
            CliTool::Gemini => "gemini",
        }
    }

    /// Directory the toolchain installer leaves in the project root.
    pub fn marker_dir(&self) -> &'static str {
        match self {
            CliTool::ClaudeCode => ".claude",
            CliTool::QwenCode => ".qwen",
            CliTool::Gemini => ".gemini",
        }
    }
}

impl fmt::Display for CliTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CliTool {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" | "claude" => Ok(CliTool::ClaudeCode),
            "qwen-code" | "qwen" => Ok(CliTool::QwenCode),
            "gemini" => Ok(CliTool::Gemini),
            other => Err(UnknownVariant::new("cli tool", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// DevStage
// ---------------------------------------------------------------------------

/// Coarse lifecycle phase a task belongs to, carried on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevStage {
    Initializing,
    SetupEnvironment,
    PendingAgents,
    CheckRequirement,
    GeneratePrd,
    DefineUxStandard,
    DesignArchitecture,
    PlanEpicAndStory,
    DefineDataModel,
    DefineApi,
    DevelopStory,
    FixBug,
    RunTest,
    Deploy,
    Done,
    Failed,
}

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// Kinds of work accepted by the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "agent:execute")]
    AgentExecute,
    #[serde(rename = "agent:chat")]
    AgentChat,
    #[serde(rename = "project:setup")]
    ProjectSetup,
    #[serde(rename = "project:deploy")]
    ProjectDeploy,
    #[serde(rename = "project:download")]
    ProjectDownload,
    #[serde(rename = "project:backup")]
    ProjectBackup,
    #[serde(rename = "websocket:broadcast")]
    WebsocketBroadcast,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::AgentExecute,
        TaskKind::AgentChat,
        TaskKind::ProjectSetup,
        TaskKind::ProjectDeploy,
        TaskKind::ProjectDownload,
        TaskKind::ProjectBackup,
        TaskKind::WebsocketBroadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::AgentExecute => "agent:execute",
            TaskKind::AgentChat => "agent:chat",
            TaskKind::ProjectSetup => "project:setup",
            TaskKind::ProjectDeploy => "project:deploy",
            TaskKind::ProjectDownload => "project:download",
            TaskKind::ProjectBackup => "project:backup",
            TaskKind::WebsocketBroadcast => "websocket:broadcast",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("task kind", s))
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Status values published for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// AgentTaskStatusMessage
// ---------------------------------------------------------------------------

/// Lifecycle event published for every task transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskStatusMessage {
    pub task_id: String,
    pub project_guid: String,
    pub agent_role: Option<AgentRole>,
    pub status: TaskStatus,
    pub dev_stage: DevStage,
    pub message: String,
    pub progress: u8,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Task payloads
// ---------------------------------------------------------------------------

/// Payload of `agent:execute` and `agent:chat` tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecutePayload {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "agent_role", alias = "agent_type")]
    pub agent_role: AgentRole,
    pub message: String,
    #[serde(alias = "dev_stage")]
    pub dev_stage: DevStage,
    #[serde(default, alias = "cli_tool")]
    pub cli_tool: Option<CliTool>,
}

/// Payload of `project:setup` tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(alias = "repo_url", alias = "gitlab_repo_url", alias = "gitlabRepoUrl")]
    pub repo_url: String,
    #[serde(
        default,
        alias = "install_toolchain",
        alias = "setupToolchain",
        alias = "setup_toolchain",
        alias = "setupBmadMethod",
        alias = "setup_bmad_method"
    )]
    pub install_toolchain: bool,
    #[serde(default, alias = "toolchain_kind", alias = "bmadCliType", alias = "bmad_cli_type")]
    pub toolchain_kind: CliTool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Payload of `project:deploy` tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployPayload {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default, alias = "deploy_options")]
    pub options: serde_json::Value,
}

fn default_environment() -> String {
    "dev".into()
}

/// Payload of `websocket:broadcast` tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastPayload {
    #[serde(alias = "project_guid")]
    pub project_guid: String,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// UnknownVariant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value}")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::CliTool;

/// Top-level configuration for the agent execution service.
///
/// Loaded from TOML (see [`Config::load`]); every section falls back to its
/// defaults, and selected keys can be overridden through `AGENTS_*`
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl Config {
    /// Load config from the first file found among `AGENTS_CONFIG`,
    /// `./config/agents.toml` and `~/.app-maker/agents.toml`, falling back to
    /// defaults. Environment overrides are applied afterwards.
    pub fn load() -> Result<Self, ConfigError> {
        let candidate = std::env::var("AGENTS_CONFIG")
            .ok()
            .map(PathBuf::from)
            .into_iter()
            .chain(Self::default_paths())
            .find(|p| p.exists());

        let mut cfg = match candidate {
            Some(path) => Self::parse_file(&path)?,
            None => Config::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific path, then apply environment overrides.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut cfg = Self::parse_file(&path.into())?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config").join("agents.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".app-maker").join("agents.toml"));
        }
        paths
    }

    /// Apply `AGENTS_*` / `WORKSPACE_PATH` overrides using `lookup` to read
    /// variables. Taking a lookup function keeps tests off the process env.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AGENTS_APP_HOST") {
            self.app.host = v;
        }
        if let Some(v) = lookup("AGENTS_APP_PORT") {
            self.app.port = parse_env("AGENTS_APP_PORT", &v)?;
        }
        if let Some(v) = lookup("AGENTS_APP_ENVIRONMENT") {
            self.app.environment = v;
        }
        if let Some(v) = lookup("WORKSPACE_PATH").or_else(|| lookup("AGENTS_APP_WORKSPACE_PATH")) {
            self.app.workspace_path = v;
        }
        if let Some(v) = lookup("AGENTS_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("AGENTS_LOG_FORMAT") {
            self.log.format = match v.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ConfigError::Validation(format!(
                        "AGENTS_LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
                    )))
                }
            };
        }
        if let Some(v) = lookup("AGENTS_COMMAND_TIMEOUT_SECS") {
            self.command.timeout_secs = parse_env("AGENTS_COMMAND_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("AGENTS_COMMAND_CLI_TOOL") {
            self.command.cli_tool = v
                .parse()
                .map_err(|e: crate::types::UnknownVariant| ConfigError::Validation(e.to_string()))?;
        }
        if let Some(v) = lookup("AGENTS_QUEUE_CONCURRENCY") {
            self.queue.concurrency = parse_env("AGENTS_QUEUE_CONCURRENCY", &v)?;
        }
        Ok(())
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.port == 0 {
            return Err(ConfigError::Validation("app.port must be non-zero".into()));
        }
        if self.app.workspace_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "app.workspace_path must not be empty".into(),
            ));
        }
        if self.command.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "command.timeout_secs must be non-zero".into(),
            ));
        }
        if self.queue.concurrency == 0 {
            return Err(ConfigError::Validation(
                "queue.concurrency must be non-zero".into(),
            ));
        }
        for rule in &self.git.rewrite_rules {
            if rule.from.is_empty() {
                return Err(ConfigError::Validation(
                    "git.rewrite_rules entries need a non-empty 'from'".into(),
                ));
            }
        }
        Ok(())
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{key} has invalid value '{value}'")))
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_workspace_path")]
    pub workspace_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            workspace_path: default_workspace_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8088
}
fn default_environment() -> String {
    "development".into()
}
fn default_workspace_path() -> String {
    "./workspace".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "debug".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Per-command deadline for shell and assistant invocations.
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
    /// Assistant used when a project carries no marker directory.
    #[serde(default)]
    pub cli_tool: CliTool,
    /// Bound of each shell session's request channel.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout(),
            cli_tool: CliTool::default(),
            request_capacity: default_request_capacity(),
        }
    }
}

fn default_command_timeout() -> u64 {
    300
}
fn default_request_capacity() -> usize {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retry: default_max_retry(),
            retention_secs: default_retention(),
            retry_delay_secs: default_retry_delay(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_concurrency() -> usize {
    100
}
fn default_max_retry() -> u32 {
    1
}
fn default_retention() -> u64 {
    3600
}
fn default_retry_delay() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of cached assistant conversation ids.
    #[serde(default = "default_session_ttl")]
    pub id_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
        }
    }
}

fn default_channel() -> String {
    "agent:task:status".into()
}

/// Prefix rewrite applied to repository URLs before cloning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default)]
    pub rewrite_rules: Vec<RewriteRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_build_command")]
    pub build_command: String,
    #[serde(default = "default_run_command")]
    pub run_command: String,
    #[serde(default = "default_deploy_timeout")]
    pub timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            build_command: default_build_command(),
            run_command: default_run_command(),
            timeout_secs: default_deploy_timeout(),
        }
    }
}

fn default_build_command() -> String {
    "make build-dev".into()
}
fn default_run_command() -> String {
    "make run-dev".into()
}
fn default_deploy_timeout() -> u64 {
    600
}

use std::sync::Arc;
use std::time::Duration;

use am_bridge::reporter::TaskReporter;
use am_core::config::RewriteRule;
use am_core::types::{CliTool, SetupPayload};
use am_core::workspace::{validate_project_guid, Workspace, WorkspaceError};
use am_session::manager::CommandExecutor;
use am_session::shell::ExecResult;
use thiserror::Error;
use tracing::{debug, info};

use crate::vcs::{rewrite_repo_url, GitHelper, VcsError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("agent ({kind}) install failed: {message}")]
    Toolchain { kind: CliTool, message: String },

    #[error("frontend dependency install failed: {0}")]
    Frontend(String),

    #[error("backend build failed: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Markdown lines reported back to the front-end, one per step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupSummary {
    lines: Vec<String>,
}

impl SetupSummary {
    fn push(&mut self, line: impl Into<String>) -> &str {
        self.lines.push(line.into());
        self.lines.last().map(String::as_str).unwrap_or_default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

mod marker {
    use am_core::types::CliTool;

    pub const CLONED: &str = "* git clone 成功";
    pub const PULLED: &str = "* 项目目录已存在, git pull 成功";
    pub const FRONTEND_INSTALLED: &str = "* 前端依赖安装成功";
    pub const FRONTEND_PRESENT: &str = "* 前端依赖已存在, 跳过安装";
    pub const BACKEND_BUILT: &str = "* 后端构建成功";
    pub const BACKEND_PRESENT: &str = "* 后端可执行文件已存在, 跳过构建";

    pub fn agent_installed(kind: CliTool) -> String {
        format!("* agent ({kind}) 安装成功")
    }

    pub fn agent_present(kind: CliTool) -> String {
        format!("* agent ({kind}) 已安装")
    }
}

// ---------------------------------------------------------------------------
// Bootstrapper
// ---------------------------------------------------------------------------

const FRONTEND_DIR: &str = "frontend";
const BACKEND_DIR: &str = "backend";
const BACKEND_BINARY: &str = "backend/server";
const NODE_MODULES: &str = "frontend/node_modules";

/// Prepares a project tree: clone or pull, assistant toolchain, frontend
/// dependencies, backend binary.
///
/// Each step checks the tree first and skips when its output already
/// exists, so running setup twice leaves the second run without changes.
/// The first failing step aborts the rest.
pub struct Bootstrapper {
    executor: Arc<dyn CommandExecutor>,
    workspace: Workspace,
    git: GitHelper,
    rewrite_rules: Vec<RewriteRule>,
    timeout: Duration,
}

impl Bootstrapper {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        workspace: Workspace,
        git: GitHelper,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            workspace,
            git,
            rewrite_rules: Vec::new(),
            timeout,
        }
    }

    pub fn with_rewrite_rules(mut self, rules: Vec<RewriteRule>) -> Self {
        self.rewrite_rules = rules;
        self
    }

    /// Run every step, reporting progress, and finish with the summary as
    /// the terminal message.
    pub async fn run(&self, payload: &SetupPayload, reporter: &TaskReporter) -> Result<SetupSummary> {
        reporter.started("setting up project environment").await;
        let mut summary = SetupSummary::default();
        match self.steps(payload, reporter, &mut summary).await {
            Ok(()) => {
                reporter.done(&summary.render()).await;
                Ok(summary)
            }
            Err(e) => {
                reporter.failed(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn steps(
        &self,
        payload: &SetupPayload,
        reporter: &TaskReporter,
        summary: &mut SetupSummary,
    ) -> Result<()> {
        let guid = payload.project_guid.as_str();
        validate_project_guid(guid)?;

        let line = self.sync_tree(guid, &payload.repo_url).await?;
        reporter.progress(30, summary.push(line)).await;

        let line = self.install_toolchain(guid, payload.toolchain_kind).await?;
        reporter.progress(60, summary.push(line)).await;

        let line = self.install_frontend(guid).await?;
        reporter.progress(80, summary.push(line)).await;

        let line = self.build_backend(guid).await?;
        reporter.progress(95, summary.push(line)).await;

        info!(project_guid = guid, "project environment ready");
        Ok(())
    }

    async fn sync_tree(&self, guid: &str, repo_url: &str) -> Result<&'static str> {
        let line = if self.workspace.project_exists(guid) {
            self.git.pull(guid).await?;
            marker::PULLED
        } else {
            let url = rewrite_repo_url(repo_url, &self.rewrite_rules);
            self.git.clone_into(&url, guid).await?;
            marker::CLONED
        };
        self.git.configure_autocrlf(guid).await?;
        Ok(line)
    }

    async fn install_toolchain(&self, guid: &str, kind: CliTool) -> Result<String> {
        if self.workspace.has_dir(guid, kind.marker_dir()) {
            debug!(project_guid = guid, %kind, "toolchain already installed");
            return Ok(marker::agent_present(kind));
        }
        let command = format!("npx bmad-method install -f -i {} -d .", kind.as_str());
        let out = self.executor.execute(guid, &command, self.timeout).await;
        if !out.success {
            return Err(BootstrapError::Toolchain {
                kind,
                message: out.failure_message(),
            });
        }
        Ok(marker::agent_installed(kind))
    }

    async fn install_frontend(&self, guid: &str) -> Result<&'static str> {
        if self.workspace.has_dir(guid, NODE_MODULES) {
            return Ok(marker::FRONTEND_PRESENT);
        }
        let out = self.run_in(guid, FRONTEND_DIR, "npm", &["install"]).await;
        if !out.success {
            return Err(BootstrapError::Frontend(out.failure_message()));
        }
        Ok(marker::FRONTEND_INSTALLED)
    }

    async fn build_backend(&self, guid: &str) -> Result<&'static str> {
        if self.workspace.has_file(guid, BACKEND_BINARY) {
            return Ok(marker::BACKEND_PRESENT);
        }
        for args in [
            &["mod", "download"][..],
            &["build", "-o", "server", "./cmd/server"][..],
        ] {
            let out = self.run_in(guid, BACKEND_DIR, "go", args).await;
            if !out.success {
                return Err(BootstrapError::Backend(out.failure_message()));
            }
        }
        Ok(marker::BACKEND_BUILT)
    }

    async fn run_in(&self, guid: &str, dir: &str, program: &str, args: &[&str]) -> ExecResult {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.executor
            .simple_execute(&format!("{guid}/{dir}"), program, &args, self.timeout)
            .await
    }
}

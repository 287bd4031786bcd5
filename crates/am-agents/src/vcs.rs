use std::sync::Arc;
use std::time::Duration;

use am_core::config::RewriteRule;
use am_session::manager::CommandExecutor;
use am_session::shell::ExecResult;
use thiserror::Error;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git {step} failed: {message}")]
    Step { step: &'static str, message: String },

    #[error("git push failed on every branch: {0}")]
    Push(String),
}

pub type Result<T> = std::result::Result<T, VcsError>;

/// Branches tried, in order, when pushing.
pub const PUSH_BRANCHES: [&str; 2] = ["master", "main"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was staged; no commit was made.
    Clean,
    Pushed { branch: &'static str },
}

pub fn default_commit_message(project_guid: &str) -> String {
    format!("Auto commit by App Maker - {project_guid}")
}

// ---------------------------------------------------------------------------
// GitHelper
// ---------------------------------------------------------------------------

/// Runs `git` against project trees.
///
/// Every invocation is argv-level through [`CommandExecutor::simple_execute`],
/// so URLs and commit messages are never interpreted by a shell.
#[derive(Clone)]
pub struct GitHelper {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl GitHelper {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    async fn git(&self, sub_path: &str, args: &[&str]) -> ExecResult {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        debug!(sub_path, ?args, "git");
        self.executor
            .simple_execute(sub_path, "git", &args, self.timeout)
            .await
    }

    async fn step(&self, sub_path: &str, step: &'static str, args: &[&str]) -> Result<ExecResult> {
        let out = self.git(sub_path, args).await;
        if out.success {
            Ok(out)
        } else {
            Err(VcsError::Step {
                step,
                message: out.failure_message(),
            })
        }
    }

    /// Clone `url` into `<workspace>/<project_guid>`.
    pub async fn clone_into(&self, url: &str, project_guid: &str) -> Result<()> {
        info!(project_guid, url, "cloning repository");
        self.step("", "clone", &["clone", "--", url, project_guid]).await?;
        Ok(())
    }

    pub async fn pull(&self, project_guid: &str) -> Result<()> {
        info!(project_guid, "pulling repository");
        self.step(
            project_guid,
            "pull",
            &["pull", "--progress", "-v", "--no-rebase", "--", "origin"],
        )
        .await?;
        Ok(())
    }

    /// Disable line-ending conversion for the project.
    pub async fn configure_autocrlf(&self, project_guid: &str) -> Result<()> {
        self.step(project_guid, "config", &["config", "core.autocrlf", "false"])
            .await?;
        Ok(())
    }

    /// Stage everything, commit when something changed and push.
    ///
    /// An empty `message` falls back to [`default_commit_message`].
    pub async fn commit_and_push(&self, project_guid: &str, message: &str) -> Result<CommitOutcome> {
        self.step(project_guid, "add", &["add", "."]).await?;

        let diff = self.git(project_guid, &["diff", "--cached", "--quiet"]).await;
        if diff.success {
            info!(project_guid, "working tree clean, nothing to commit");
            return Ok(CommitOutcome::Clean);
        }

        let message = if message.trim().is_empty() {
            default_commit_message(project_guid)
        } else {
            message.to_string()
        };
        self.step(project_guid, "commit", &["commit", "-m", message.as_str()])
            .await?;

        let mut last_error = String::new();
        for branch in PUSH_BRANCHES {
            let out = self
                .git(project_guid, &["push", "-u", "origin", branch])
                .await;
            if out.success {
                info!(project_guid, branch, "changes pushed");
                return Ok(CommitOutcome::Pushed { branch });
            }
            last_error = out.failure_message();
            warn!(project_guid, branch, error = %last_error, "push failed");
        }
        Err(VcsError::Push(last_error))
    }
}

// ---------------------------------------------------------------------------
// URL rewriting
// ---------------------------------------------------------------------------

/// Turn an SSH remote into the HTTP form reachable from the workspace.
///
/// Configured prefix rules win; otherwise `git@host:path` and
/// `ssh://git@host[:port]/path` become `http://host/path`.
pub fn rewrite_repo_url(url: &str, rules: &[RewriteRule]) -> String {
    let url = url.trim();
    for rule in rules.iter().filter(|r| !r.from.is_empty()) {
        if let Some(rest) = url.strip_prefix(rule.from.as_str()) {
            return format!("{}{rest}", rule.to);
        }
    }

    if let Some(rest) = url.strip_prefix("ssh://git@") {
        if let Some((authority, path)) = rest.split_once('/') {
            let host = authority.split(':').next().unwrap_or(authority);
            return format!("http://{host}/{path}");
        }
    }
    if let Some(rest) = url.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            return format!("http://{host}/{path}");
        }
    }
    url.to_string()
}

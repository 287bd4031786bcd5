#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use am_agents::bootstrap::Bootstrapper;
use am_agents::deploy::DeployPipeline;
use am_agents::pipeline::AgentPipeline;
use am_agents::vcs::GitHelper;
use am_bridge::event_bus::EventBus;
use am_bridge::protocol::BridgeMessage;
use am_bridge::publisher::{BusPublisher, EventPublisher};
use am_bridge::reporter::TaskReporter;
use am_core::cache::MemoryCache;
use am_core::config::DeployConfig;
use am_core::session_store::SessionIdStore;
use am_core::types::{AgentRole, AgentTaskStatusMessage, DevStage};
use am_core::workspace::Workspace;
use am_session::manager::CommandExecutor;
use am_session::shell::ExecResult;
use async_trait::async_trait;

pub const CHANNEL: &str = "agent:task:status";

/// One command seen by the executor.
#[derive(Debug, Clone)]
pub struct Call {
    /// Project GUID for shell commands, sub path for direct spawns.
    pub dir: String,
    /// Shell command, or `program arg1 arg2 ...`.
    pub line: String,
    pub shell: bool,
}

struct Rule {
    prefix: String,
    exit: i32,
    stdout: String,
    stderr: String,
    once: bool,
    used: bool,
}

/// Records every command and answers from prefix rules.
///
/// The first unused rule whose prefix matches wins; unmatched commands
/// succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, prefix: &str, exit: i32, stdout: &str, stderr: &str) -> &Self {
        self.push(prefix, exit, stdout, stderr, false)
    }

    pub fn once(&self, prefix: &str, exit: i32, stdout: &str, stderr: &str) -> &Self {
        self.push(prefix, exit, stdout, stderr, true)
    }

    fn push(&self, prefix: &str, exit: i32, stdout: &str, stderr: &str, once: bool) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            exit,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            once,
            used: false,
        });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.line).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.lines().iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn reply(&self, dir: &str, line: String, shell: bool) -> ExecResult {
        self.calls.lock().unwrap().push(Call {
            dir: dir.to_string(),
            line: line.clone(),
            shell,
        });
        let mut rules = self.rules.lock().unwrap();
        match rules
            .iter_mut()
            .find(|r| !(r.once && r.used) && line.starts_with(&r.prefix))
        {
            Some(rule) => {
                rule.used = true;
                ExecResult::completed(rule.exit, rule.stdout.clone(), rule.stderr.clone())
            }
            None => ExecResult::completed(0, "", ""),
        }
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, project_guid: &str, command: &str, _timeout: Duration) -> ExecResult {
        self.reply(project_guid, command.to_string(), true)
    }

    async fn simple_execute(
        &self,
        sub_path: &str,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> ExecResult {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.reply(sub_path, line, false)
    }
}

/// Pipelines wired to a scripted executor over a temporary workspace.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub workspace: Workspace,
    pub executor: Arc<ScriptedExecutor>,
    pub sessions: SessionIdStore,
    pub bus: EventBus,
    pub publisher: Arc<dyn EventPublisher>,
    pub events: flume::Receiver<BridgeMessage>,
    pub pipeline: Arc<AgentPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let executor = ScriptedExecutor::new();
        let sessions = SessionIdStore::new(Arc::new(MemoryCache::new()));
        let bus = EventBus::new();
        let events = bus.subscribe(CHANNEL);
        let publisher: Arc<dyn EventPublisher> = Arc::new(BusPublisher::new(bus.clone(), CHANNEL));
        let git = GitHelper::new(executor.clone(), Duration::from_secs(5));
        let pipeline = Arc::new(AgentPipeline::new(
            executor.clone(),
            workspace.clone(),
            sessions.clone(),
            git,
            Duration::from_secs(5),
        ));
        Self {
            dir,
            workspace,
            executor,
            sessions,
            bus,
            publisher,
            events,
            pipeline,
        }
    }

    pub fn bootstrapper(&self) -> Bootstrapper {
        Bootstrapper::new(
            self.executor.clone(),
            self.workspace.clone(),
            GitHelper::new(self.executor.clone(), Duration::from_secs(5)),
            Duration::from_secs(5),
        )
    }

    pub fn deploy(&self) -> DeployPipeline {
        DeployPipeline::new(self.executor.clone(), self.pipeline.clone(), &DeployConfig::default())
    }

    pub fn reporter(&self, guid: &str, role: Option<AgentRole>, stage: DevStage) -> TaskReporter {
        TaskReporter::detached(self.publisher.clone(), "t-1", guid, role, stage)
    }

    /// Create `<workspace>/<guid>/<relative>` as a directory.
    pub fn mkdir(&self, guid: &str, relative: &str) {
        std::fs::create_dir_all(self.workspace.project_path(guid).join(relative)).unwrap();
    }

    pub fn touch(&self, guid: &str, relative: &str) {
        let path = self.workspace.project_path(guid).join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    /// Status events published so far.
    pub fn drain(&self) -> Vec<AgentTaskStatusMessage> {
        self.events
            .try_iter()
            .filter_map(|m| m.as_task_status().cloned())
            .collect()
    }
}

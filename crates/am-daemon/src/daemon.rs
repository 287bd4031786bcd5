use std::sync::Arc;
use std::time::Duration;

use am_agents::bootstrap::Bootstrapper;
use am_agents::deploy::DeployPipeline;
use am_agents::handlers::AgentServices;
use am_agents::pipeline::AgentPipeline;
use am_agents::vcs::GitHelper;
use am_bridge::dispatch::TaskDispatcher;
use am_bridge::event_bus::EventBus;
use am_bridge::http_api::{api_router, ApiState};
use am_bridge::publisher::{BusPublisher, EventPublisher};
use am_core::cache::{KvCache, MemoryCache};
use am_core::config::Config;
use am_core::session_store::SessionIdStore;
use am_core::workspace::Workspace;
use am_harness::broker::{MemoryBroker, TaskBroker};
use am_harness::project_lock::ProjectLocks;
use am_harness::shutdown::ShutdownSignal;
use am_harness::worker::WorkerPool;
use am_session::manager::{CommandExecutor, SessionManager};
use am_session::shell::ShellSpec;
use anyhow::{Context, Result};
use tracing::{debug, error, info};

/// How long in-flight tasks may run after shutdown is requested.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The agent execution service.
///
/// Owns every long-lived component: shell sessions, the task broker and
/// worker pool, the event bus and the HTTP API. [`run`](Self::run) serves
/// until the [`ShutdownSignal`] fires, drains the workers and kills all
/// shell sessions.
pub struct Daemon {
    config: Config,
    shutdown: ShutdownSignal,
    event_bus: EventBus,
    broker: Arc<MemoryBroker>,
    cache: Arc<MemoryCache>,
    sessions: Arc<SessionManager>,
    api_state: Arc<ApiState>,
    services: AgentServices,
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self> {
        let workspace = Workspace::new(&config.app.workspace_path);
        workspace
            .ensure()
            .context("failed to prepare workspace directory")?;

        let sessions = Arc::new(SessionManager::with_shell(
            workspace.clone(),
            ShellSpec::platform_default(),
            config.command.request_capacity,
        ));
        let executor: Arc<dyn CommandExecutor> = sessions.clone();
        let cache = Arc::new(MemoryCache::new());
        let kv: Arc<dyn KvCache> = cache.clone();

        let event_bus = EventBus::new();
        let publisher: Arc<dyn EventPublisher> =
            Arc::new(BusPublisher::new(event_bus.clone(), &config.events.channel));
        let broker = Arc::new(MemoryBroker::new(Duration::from_secs(
            config.queue.retry_delay_secs,
        )));
        let dispatcher = TaskDispatcher::new(broker.clone(), publisher.clone()).with_retry_policy(
            config.queue.max_retry,
            Duration::from_secs(config.queue.retention_secs),
        );

        let timeout = config.command.timeout();
        let git = GitHelper::new(executor.clone(), timeout);
        let pipeline = Arc::new(
            AgentPipeline::new(
                executor.clone(),
                workspace.clone(),
                SessionIdStore::with_ttl(
                    kv.clone(),
                    Duration::from_secs(config.session.id_ttl_secs),
                ),
                git.clone(),
                timeout,
            )
            .with_fallback_tool(config.command.cli_tool),
        );
        let bootstrapper = Arc::new(
            Bootstrapper::new(executor.clone(), workspace, git, timeout)
                .with_rewrite_rules(config.git.rewrite_rules.clone()),
        );
        let deploy = Arc::new(DeployPipeline::new(
            executor.clone(),
            pipeline.clone(),
            &config.deploy,
        ));
        let services = AgentServices {
            pipeline,
            bootstrapper,
            deploy,
            publisher,
        };

        let api_state = Arc::new(ApiState::new(
            dispatcher,
            event_bus.clone(),
            config.events.channel.clone(),
            executor,
            kv,
        ));

        Ok(Self {
            config,
            shutdown: ShutdownSignal::new(),
            event_bus,
            broker,
            cache,
            sessions,
            api_state,
            services,
        })
    }

    /// Returns a handle that can be used to trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }

    pub fn api_state(&self) -> &Arc<ApiState> {
        &self.api_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.app.host, self.config.app.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        self.run_with_listener(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn run_with_listener(&self, listener: tokio::net::TcpListener) -> Result<()> {
        let bind_addr = listener.local_addr()?;
        let router = api_router(self.api_state.clone());
        let signal = self.shutdown.clone();
        let api_handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.triggered().await });
            if let Err(e) = serve.await {
                error!(error = %e, "API server error");
            }
        });
        info!(%bind_addr, workspace = %self.config.app.workspace_path, "API server listening");

        let pool = WorkerPool::new(
            self.broker.clone(),
            self.services.task_mux(),
            self.config.queue.concurrency,
        );
        let janitor = tokio::spawn(Self::janitor(
            self.broker.clone(),
            self.cache.clone(),
            pool.project_locks().clone(),
            Duration::from_secs(self.config.queue.sweep_interval_secs.max(1)),
            self.shutdown.clone(),
        ));

        pool.run(self.shutdown.clone(), DRAIN_TIMEOUT).await;

        self.broker.close().await;
        if let Err(e) = api_handle.await {
            error!(error = %e, "API server task failed");
        }
        janitor.abort();
        self.sessions.cleanup_all().await;
        info!("daemon stopped");
        Ok(())
    }

    /// Periodically drop expired task records, cache entries and idle
    /// project locks.
    async fn janitor(
        broker: Arc<MemoryBroker>,
        cache: Arc<MemoryCache>,
        locks: ProjectLocks,
        every: Duration,
        shutdown: ShutdownSignal,
    ) {
        let mut tick = tokio::time::interval(every);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = tick.tick() => {
                    let tasks = broker.purge_expired();
                    let entries = cache.purge_expired().await;
                    let idle_locks = locks.prune();
                    if tasks + entries + idle_locks > 0 {
                        debug!(tasks, entries, idle_locks, "expired records swept");
                    }
                }
            }
        }
    }
}

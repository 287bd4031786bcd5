use std::sync::Arc;
use std::time::Duration;

use am_core::cache::KvCache;
use am_harness::broker::TaskBroker;
use am_session::manager::CommandExecutor;

use crate::dispatch::TaskDispatcher;
use crate::event_bus::EventBus;

/// How long a health report is served from the cache.
pub(crate) const HEALTH_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub(crate) const HEALTH_CACHE_KEY: &str = "agent:health:check";

/// Shared application state for all HTTP/WS handlers.
pub struct ApiState {
    pub dispatcher: TaskDispatcher,
    pub event_bus: EventBus,
    /// Bus channel streamed to WebSocket clients.
    pub events_channel: String,
    /// Runs the `--version` probes of the health check.
    pub executor: Arc<dyn CommandExecutor>,
    pub cache: Arc<dyn KvCache>,
    pub version: String,
}

impl ApiState {
    pub fn new(
        dispatcher: TaskDispatcher,
        event_bus: EventBus,
        events_channel: impl Into<String>,
        executor: Arc<dyn CommandExecutor>,
        cache: Arc<dyn KvCache>,
    ) -> Self {
        Self {
            dispatcher,
            event_bus,
            events_channel: events_channel.into(),
            executor,
            cache,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn broker(&self) -> &Arc<dyn TaskBroker> {
        self.dispatcher.broker()
    }
}

//! Per-(project, role) assistant conversation ids.
//!
//! Writes are best-effort and reads treat any failure as a miss: losing a
//! conversation id only means the next turn starts a fresh conversation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::KvCache;
use crate::types::AgentRole;

/// Conversation ids expire after a day by default.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key for a project's conversation with one role.
pub fn session_key(project_guid: &str, role: AgentRole) -> String {
    format!("project:{project_guid}:sessions:{}", role.as_str())
}

#[derive(Clone)]
pub struct SessionIdStore {
    cache: Arc<dyn KvCache>,
    ttl: Duration,
}

impl SessionIdStore {
    pub fn new(cache: Arc<dyn KvCache>) -> Self {
        Self::with_ttl(cache, DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(cache: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Persist `session_id`. Failures are logged, never returned.
    pub async fn save(&self, project_guid: &str, role: AgentRole, session_id: &str) {
        let key = session_key(project_guid, role);
        match self.cache.set(&key, session_id.to_string(), self.ttl).await {
            Ok(()) => debug!(project_guid, %role, session_id, "conversation id saved"),
            Err(e) => warn!(project_guid, %role, error = %e, "failed to save conversation id"),
        }
    }

    /// Last saved id, or `""` on a miss or a cache failure.
    pub async fn get(&self, project_guid: &str, role: AgentRole) -> String {
        let key = session_key(project_guid, role);
        match self.cache.get(&key).await {
            Ok(Some(id)) => id,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(project_guid, %role, error = %e, "failed to read conversation id");
                String::new()
            }
        }
    }
}

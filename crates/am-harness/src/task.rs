use std::time::Duration;

use am_core::types::{TaskKind, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broker-assigned task identifier.
pub type TaskId = String;

// ---------------------------------------------------------------------------
// QueueName
// ---------------------------------------------------------------------------

/// Priority queues. Dequeue picks among non-empty queues in proportion to
/// their weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Critical,
    Default,
    Low,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Critical, QueueName::Default, QueueName::Low];

    pub fn weight(&self) -> i64 {
        match self {
            QueueName::Critical => 6,
            QueueName::Default => 3,
            QueueName::Low => 1,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            QueueName::Critical => 0,
            QueueName::Default => 1,
            QueueName::Low => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// TaskOptions
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_RETRY: u32 = 1;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub queue: QueueName,
    pub max_retry: u32,
    /// How long the record survives after reaching a terminal state.
    pub retention: Duration,
    /// Tasks sharing a group key never run concurrently (the project GUID).
    pub group_key: Option<String>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            queue: QueueName::Default,
            max_retry: DEFAULT_MAX_RETRY,
            retention: DEFAULT_RETENTION,
            group_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// NewTask / Task
// ---------------------------------------------------------------------------

/// A task as submitted, before the broker assigns an id.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: TaskKind,
    pub payload: Vec<u8>,
    pub options: TaskOptions,
}

impl NewTask {
    pub fn new(kind: TaskKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            options: TaskOptions::default(),
        }
    }

    /// Encode `payload` as JSON.
    pub fn json<T: Serialize>(kind: TaskKind, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_vec(payload)?))
    }

    pub fn queue(mut self, queue: QueueName) -> Self {
        self.options.queue = queue;
        self
    }

    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.options.max_retry = max_retry;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.options.retention = retention;
        self
    }

    pub fn group(mut self, key: impl Into<String>) -> Self {
        self.options.group_key = Some(key.into());
        self
    }
}

/// A task handed to a worker. The payload is never mutated.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub payload: std::sync::Arc<[u8]>,
    pub options: TaskOptions,
    /// Number of earlier attempts that failed.
    pub retried: u32,
}

impl Task {
    pub fn is_final_attempt(&self) -> bool {
        self.retried >= self.options.max_retry
    }
}

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// Broker-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Retry,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

// ---------------------------------------------------------------------------
// TaskResult / TaskInfo
// ---------------------------------------------------------------------------

/// Incremental result written by handlers and served to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of a task for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub kind: TaskKind,
    pub queue: QueueName,
    pub state: TaskState,
    pub retried: u32,
    pub max_retry: u32,
    pub last_error: Option<String>,
    pub result: Option<TaskResult>,
    pub enqueued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// The record a poller sees: the handler's latest result if any,
    /// otherwise one derived from the broker state.
    pub fn current_result(&self) -> TaskResult {
        let derived_status = match self.state {
            TaskState::Queued => TaskStatus::Pending,
            TaskState::Running | TaskState::Retry => TaskStatus::InProgress,
            TaskState::Done => TaskStatus::Done,
            TaskState::Failed => TaskStatus::Failed,
        };
        match &self.result {
            // A handler may never have reported a terminal status (a panic,
            // or an unknown kind); the broker state wins then.
            Some(r) if self.state.is_terminal() && !r.status.is_terminal() => TaskResult {
                status: derived_status,
                message: self.last_error.clone().unwrap_or_else(|| r.message.clone()),
                updated_at: self.completed_at.unwrap_or(r.updated_at),
                ..r.clone()
            },
            Some(r) => r.clone(),
            None => TaskResult {
                task_id: self.id.clone(),
                status: derived_status,
                progress: if derived_status == TaskStatus::Done { 100 } else { 0 },
                message: self.last_error.clone().unwrap_or_default(),
                updated_at: self.completed_at.unwrap_or(self.enqueued_at),
            },
        }
    }
}

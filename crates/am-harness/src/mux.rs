use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use am_core::types::{TaskKind, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::broker::TaskBroker;
use crate::task::{Task, TaskId, TaskResult};

// ---------------------------------------------------------------------------
// HandlerError
// ---------------------------------------------------------------------------

/// Failure returned by a task handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Eligible for retry while the task has retries left.
    #[error("{0}")]
    Failed(String),

    /// Fails the task without retrying (e.g. an undecodable payload).
    #[error("{0}")]
    SkipRetry(String),
}

impl HandlerError {
    pub fn failed(err: impl fmt::Display) -> Self {
        HandlerError::Failed(err.to_string())
    }

    pub fn skip_retry(err: impl fmt::Display) -> Self {
        HandlerError::SkipRetry(err.to_string())
    }

    pub fn is_skip_retry(&self) -> bool {
        matches!(self, HandlerError::SkipRetry(_))
    }
}

// ---------------------------------------------------------------------------
// TaskContext
// ---------------------------------------------------------------------------

/// What a handler sees of the task it runs.
#[derive(Clone)]
pub struct TaskContext {
    task: Task,
    broker: Arc<dyn TaskBroker>,
}

impl TaskContext {
    pub fn new(task: Task, broker: Arc<dyn TaskBroker>) -> Self {
        Self { task, broker }
    }

    pub fn id(&self) -> &str {
        &self.task.id
    }

    pub fn kind(&self) -> TaskKind {
        self.task.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.task.payload
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Whether a failure of this attempt is final.
    pub fn is_final_attempt(&self) -> bool {
        self.task.is_final_attempt()
    }

    /// Decode the JSON payload; decoding errors skip retry.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_slice(&self.task.payload).map_err(|e| {
            HandlerError::skip_retry(format!("invalid {} payload: {e}", self.task.kind))
        })
    }

    pub fn result_writer(&self) -> ResultWriter {
        ResultWriter {
            task_id: self.task.id.clone(),
            broker: self.broker.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResultWriter
// ---------------------------------------------------------------------------

/// Writes a task's incremental result record into the broker.
#[derive(Clone)]
pub struct ResultWriter {
    task_id: TaskId,
    broker: Arc<dyn TaskBroker>,
}

impl ResultWriter {
    pub fn new(task_id: impl Into<TaskId>, broker: Arc<dyn TaskBroker>) -> Self {
        Self {
            task_id: task_id.into(),
            broker,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Progress recorded by an earlier attempt, if any.
    pub async fn last_progress(&self) -> u8 {
        self.broker
            .task_info(&self.task_id)
            .await
            .and_then(|info| info.result)
            .map(|r| r.progress)
            .unwrap_or(0)
    }

    /// Best effort: a write failure is logged and swallowed.
    pub async fn write(&self, status: TaskStatus, progress: u8, message: &str) {
        let result = TaskResult {
            task_id: self.task_id.clone(),
            status,
            progress,
            message: message.to_string(),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.broker.write_result(result).await {
            warn!(task_id = %self.task_id, error = %e, "failed to write task result");
        }
    }
}

// ---------------------------------------------------------------------------
// TaskHandler / TaskMux
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: &TaskContext) -> Result<(), HandlerError>;
}

/// Routes tasks to handlers by kind.
#[derive(Default, Clone)]
pub struct TaskMux {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any earlier registration.
    pub fn handle(&mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn handles(&self, kind: TaskKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub async fn route(&self, ctx: &TaskContext) -> Result<(), HandlerError> {
        match self.handlers.get(&ctx.kind()) {
            Some(handler) => {
                debug!(task_id = ctx.id(), kind = %ctx.kind(), "dispatching task");
                handler.handle(ctx).await
            }
            None => Err(HandlerError::skip_retry(format!(
                "no handler registered for task kind {}",
                ctx.kind()
            ))),
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use am_core::types::{
    AgentExecutePayload, AgentRole, AgentTaskStatusMessage, BroadcastPayload, DeployPayload,
    DevStage, SetupPayload, TaskKind, TaskStatus,
};
use am_harness::broker::{QueueError, TaskBroker};
use am_harness::task::{NewTask, QueueName, TaskId, DEFAULT_MAX_RETRY, DEFAULT_RETENTION};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::publisher::EventPublisher;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode task payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Submits typed work to the broker.
///
/// Every project-scoped task is grouped by its project GUID so the worker
/// pool never runs two of them at once. Agent, setup and deploy tasks
/// publish a `pending` event once the broker has accepted them.
#[derive(Clone)]
pub struct TaskDispatcher {
    broker: Arc<dyn TaskBroker>,
    publisher: Arc<dyn EventPublisher>,
    max_retry: u32,
    retention: Duration,
}

impl TaskDispatcher {
    pub fn new(broker: Arc<dyn TaskBroker>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            broker,
            publisher,
            max_retry: DEFAULT_MAX_RETRY,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retry_policy(mut self, max_retry: u32, retention: Duration) -> Self {
        self.max_retry = max_retry;
        self.retention = retention;
        self
    }

    pub fn broker(&self) -> &Arc<dyn TaskBroker> {
        &self.broker
    }

    /// A role turn issued from one of the dedicated agent routes.
    pub async fn enqueue_agent(&self, payload: AgentExecutePayload) -> Result<TaskId> {
        let pending = Pending {
            role: Some(payload.agent_role),
            stage: payload.dev_stage,
        };
        let guid = payload.project_guid.clone();
        self.submit(TaskKind::AgentExecute, &payload, QueueName::Default, &guid, Some(pending))
            .await
    }

    pub async fn enqueue_chat(&self, payload: AgentExecutePayload) -> Result<TaskId> {
        let pending = Pending {
            role: Some(payload.agent_role),
            stage: payload.dev_stage,
        };
        let guid = payload.project_guid.clone();
        self.submit(TaskKind::AgentChat, &payload, QueueName::Default, &guid, Some(pending))
            .await
    }

    pub async fn enqueue_setup(&self, payload: SetupPayload) -> Result<TaskId> {
        let pending = Pending {
            role: None,
            stage: DevStage::SetupEnvironment,
        };
        let guid = payload.project_guid.clone();
        self.submit(TaskKind::ProjectSetup, &payload, QueueName::Default, &guid, Some(pending))
            .await
    }

    pub async fn enqueue_deploy(&self, payload: DeployPayload) -> Result<TaskId> {
        let pending = Pending {
            role: Some(AgentRole::Dev),
            stage: DevStage::Deploy,
        };
        let guid = payload.project_guid.clone();
        self.submit(TaskKind::ProjectDeploy, &payload, QueueName::Critical, &guid, Some(pending))
            .await
    }

    pub async fn enqueue_broadcast(&self, payload: BroadcastPayload) -> Result<TaskId> {
        let guid = payload.project_guid.clone();
        self.submit(TaskKind::WebsocketBroadcast, &payload, QueueName::Low, &guid, None)
            .await
    }

    async fn submit<T: Serialize>(
        &self,
        kind: TaskKind,
        payload: &T,
        queue: QueueName,
        project_guid: &str,
        pending: Option<Pending>,
    ) -> Result<TaskId> {
        let task = NewTask::json(kind, payload)?
            .queue(queue)
            .max_retry(self.max_retry)
            .retention(self.retention)
            .group(project_guid);
        let task_id = self.broker.enqueue(task).await?;
        info!(%task_id, %kind, project_guid, ?queue, "task submitted");

        if let Some(p) = pending {
            let event = AgentTaskStatusMessage {
                task_id: task_id.clone(),
                project_guid: project_guid.to_string(),
                agent_role: p.role,
                status: TaskStatus::Pending,
                dev_stage: p.stage,
                message: "task queued".into(),
                progress: 0,
                timestamp: Utc::now(),
            };
            if let Err(e) = self.publisher.publish(event.into()).await {
                warn!(%task_id, error = %e, "failed to publish pending status");
            }
        }
        Ok(task_id)
    }
}

struct Pending {
    role: Option<AgentRole>,
    stage: DevStage,
}

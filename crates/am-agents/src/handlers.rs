//! Worker-pool handlers for every task kind this service executes.

use std::sync::Arc;

use am_bridge::protocol::BridgeMessage;
use am_bridge::publisher::EventPublisher;
use am_bridge::reporter::TaskReporter;
use am_core::types::{
    AgentExecutePayload, AgentRole, BroadcastPayload, DeployPayload, DevStage, SetupPayload,
    TaskKind,
};
use am_harness::mux::{HandlerError, TaskContext, TaskHandler, TaskMux};
use async_trait::async_trait;
use tracing::debug;

use crate::bootstrap::Bootstrapper;
use crate::deploy::DeployPipeline;
use crate::pipeline::AgentPipeline;

/// `agent:execute` and `agent:chat`.
pub struct AgentTaskHandler {
    pipeline: Arc<AgentPipeline>,
    publisher: Arc<dyn EventPublisher>,
}

#[async_trait]
impl TaskHandler for AgentTaskHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<(), HandlerError> {
        let payload: AgentExecutePayload = ctx.decode()?;
        let reporter = TaskReporter::for_task(
            ctx,
            self.publisher.clone(),
            payload.project_guid.clone(),
            Some(payload.agent_role),
            payload.dev_stage,
        )
        .await;
        self.pipeline
            .execute(&payload, &reporter)
            .await
            .map(|_| ())
            .map_err(HandlerError::failed)
    }
}

/// `project:setup`.
pub struct SetupTaskHandler {
    bootstrapper: Arc<Bootstrapper>,
    publisher: Arc<dyn EventPublisher>,
}

#[async_trait]
impl TaskHandler for SetupTaskHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<(), HandlerError> {
        let payload: SetupPayload = ctx.decode()?;
        let reporter = TaskReporter::for_task(
            ctx,
            self.publisher.clone(),
            payload.project_guid.clone(),
            None,
            DevStage::SetupEnvironment,
        )
        .await;
        self.bootstrapper
            .run(&payload, &reporter)
            .await
            .map(|_| ())
            .map_err(HandlerError::failed)
    }
}

/// `project:deploy`.
pub struct DeployTaskHandler {
    deploy: Arc<DeployPipeline>,
    publisher: Arc<dyn EventPublisher>,
}

#[async_trait]
impl TaskHandler for DeployTaskHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<(), HandlerError> {
        let payload: DeployPayload = ctx.decode()?;
        let reporter = TaskReporter::for_task(
            ctx,
            self.publisher.clone(),
            payload.project_guid.clone(),
            Some(AgentRole::Dev),
            DevStage::Deploy,
        )
        .await;
        self.deploy
            .run(&payload, &reporter)
            .await
            .map(|_| ())
            .map_err(HandlerError::failed)
    }
}

/// `websocket:broadcast`: forwards the payload to event subscribers.
pub struct BroadcastTaskHandler {
    publisher: Arc<dyn EventPublisher>,
}

#[async_trait]
impl TaskHandler for BroadcastTaskHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<(), HandlerError> {
        let payload: BroadcastPayload = ctx.decode()?;
        debug!(task_id = ctx.id(), project_guid = %payload.project_guid, event = %payload.event, "broadcasting");
        self.publisher
            .publish(BridgeMessage::Broadcast(payload))
            .await
            .map_err(HandlerError::failed)
    }
}

/// Everything the handlers need, shared across workers.
#[derive(Clone)]
pub struct AgentServices {
    pub pipeline: Arc<AgentPipeline>,
    pub bootstrapper: Arc<Bootstrapper>,
    pub deploy: Arc<DeployPipeline>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl AgentServices {
    /// Mux with a handler for each kind this service executes.
    ///
    /// `project:download` and `project:backup` stay unregistered; the mux
    /// fails them without retry.
    pub fn task_mux(&self) -> TaskMux {
        let agent: Arc<dyn TaskHandler> = Arc::new(AgentTaskHandler {
            pipeline: self.pipeline.clone(),
            publisher: self.publisher.clone(),
        });
        let mut mux = TaskMux::new();
        mux.handle(TaskKind::AgentExecute, agent.clone())
            .handle(TaskKind::AgentChat, agent)
            .handle(
                TaskKind::ProjectSetup,
                Arc::new(SetupTaskHandler {
                    bootstrapper: self.bootstrapper.clone(),
                    publisher: self.publisher.clone(),
                }),
            )
            .handle(
                TaskKind::ProjectDeploy,
                Arc::new(DeployTaskHandler {
                    deploy: self.deploy.clone(),
                    publisher: self.publisher.clone(),
                }),
            )
            .handle(
                TaskKind::WebsocketBroadcast,
                Arc::new(BroadcastTaskHandler {
                    publisher: self.publisher.clone(),
                }),
            );
        mux
    }
}

use std::sync::Arc;

use am_core::types::{DeployPayload, SetupPayload};
use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::api_response::{ApiResponse, TaskCreated};

use super::agents::{accept, Created};
use super::state::ApiState;

/// POST /api/v1/projects/setup
pub(crate) async fn setup(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SetupPayload>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let task_id = state.dispatcher.enqueue_setup(req).await?;
    Ok(ApiResponse::success(
        "project setup task created",
        TaskCreated { task_id },
    ))
}

/// POST /api/v1/agent/dev/deploy
pub(crate) async fn deploy(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<DeployPayload>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let task_id = state.dispatcher.enqueue_deploy(req).await?;
    Ok(ApiResponse::success("deploy task created", TaskCreated { task_id }))
}

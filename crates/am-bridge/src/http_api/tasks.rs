use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api_error::ApiError;
use crate::api_response::ApiResponse;

use super::state::ApiState;
use super::types::TaskView;

/// GET /api/v1/tasks/{id} -- latest result record of a task.
pub(crate) async fn get_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TaskView>>, ApiError> {
    let info = state
        .broker()
        .task_info(&id)
        .await
        .ok_or_else(|| ApiError::TaskNotFound(id.clone()))?;
    let result = info.current_result();
    let view = TaskView {
        task_id: info.id.clone(),
        kind: info.kind,
        queue: info.queue,
        state: info.state,
        status: result.status,
        progress: result.progress,
        message: result.message,
        retried: info.retried,
        max_retry: info.max_retry,
        enqueued_at: info.enqueued_at,
        updated_at: result.updated_at,
    };
    Ok(ApiResponse::success("task status", view))
}

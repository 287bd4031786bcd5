//! HTTP API error types.
//!
//! Every variant maps to a business code; the HTTP status stays 200 and
//! the code travels in the [`ApiResponse`] envelope. Non-200 statuses are
//! left to transport-level faults raised by axum itself.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::warn;

use crate::api_response::{codes, ApiResponse};
use crate::dispatch::DispatchError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body was malformed or failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No task record exists (never enqueued, or retention elapsed).
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The broker refused the task.
    #[error("failed to enqueue task: {0}")]
    Enqueue(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> i32 {
        match self {
            ApiError::Validation(_) => codes::VALIDATION_ERROR,
            ApiError::TaskNotFound(_) => codes::TASK_NOT_FOUND,
            ApiError::Enqueue(_) => codes::TASK_INTERNAL_ERROR,
            ApiError::Internal(_) => codes::ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::Enqueue(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// IntoResponse implementation
// ---------------------------------------------------------------------------

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        if code != codes::VALIDATION_ERROR {
            warn!(code, error = %self, "request failed");
        }
        let body = ApiResponse::error(code, self.to_string());
        (StatusCode::OK, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business result codes carried in every response body.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const VALIDATION_ERROR: i32 = 400;
    pub const TASK_NOT_FOUND: i32 = 404;
    pub const TASK_INTERNAL_ERROR: i32 = 2500;
}

/// Envelope of every HTTP response: `{code, message, data?, timestamp}`.
///
/// Business failures are reported through `code` with HTTP status 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            code: codes::SUCCESS,
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now(),
        })
    }
}

impl ApiResponse<()> {
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }
}

/// `data` of every enqueue endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    pub task_id: String,
}

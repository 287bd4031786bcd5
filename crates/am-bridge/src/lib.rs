//! Event fan-out and HTTP ingress for the agent service.
//!
//! - [`event_bus`] / [`publisher`]: in-process pub/sub for task lifecycle
//!   events
//! - [`reporter`]: per-task status reporting (monotonic progress, one
//!   terminal event)
//! - [`dispatch`]: typed task submission
//! - [`prompts`]: assistant messages for each agent route
//! - [`http_api`]: the axum router under `/api/v1`

pub mod api_error;
pub mod api_response;
pub mod dispatch;
pub mod event_bus;
pub mod http_api;
pub mod prompts;
pub mod protocol;
pub mod publisher;
pub mod reporter;

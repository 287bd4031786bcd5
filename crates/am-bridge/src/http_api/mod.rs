// ---------------------------------------------------------------------------
// HTTP API module directory
// ---------------------------------------------------------------------------
//
// Thin ingress over the task dispatcher: every POST validates its body,
// composes the assistant message where relevant and enqueues one task.
// This file owns the Axum router and re-exports the public items used by
// `am-daemon`.

mod agents;
mod health;
mod projects;
pub mod state;
mod tasks;
#[cfg(test)]
mod tests;
pub mod types;
mod websocket;

pub use state::ApiState;
pub use types::*;

pub use self::router::{api_router, API_PREFIX};

mod router {
    use super::*;
    use axum::{
        routing::{get, post},
        Router,
    };
    use std::sync::Arc;
    use tower_http::trace::TraceLayer;

    pub const API_PREFIX: &str = "/api/v1";

    /// Build the full API router with all REST and WebSocket routes.
    pub fn api_router(state: Arc<ApiState>) -> Router {
        let v1 = Router::new()
            .route("/health", get(health::health))
            .route("/tasks/{id}", get(tasks::get_task))
            .route("/ws", get(websocket::ws_handler))
            // Projects
            .route("/projects/setup", post(projects::setup))
            .route("/project/setup", post(projects::setup))
            // Agents
            .route("/agent/chat", post(agents::chat))
            .route("/agent/analyse/project-brief", post(agents::project_brief))
            .route("/agent/pm/prd", post(agents::prd))
            .route("/agent/ux-expert/ux-standard", post(agents::ux_standard))
            .route("/agent/architect/architect", post(agents::architecture))
            .route("/agent/architect/database", post(agents::database))
            .route("/agent/architect/apidefinition", post(agents::api_definition))
            .route("/agent/po/epicsandstories", post(agents::epics_and_stories))
            .route("/agent/dev/implstory", post(agents::implement_story))
            .route("/agent/dev/fixbug", post(agents::fix_bug))
            .route("/agent/dev/runtest", post(agents::run_test))
            .route("/agent/dev/deploy", post(projects::deploy));

        Router::new()
            .nest(API_PREFIX, v1)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

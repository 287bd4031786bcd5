use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use am_core::cache::{KvCache, MemoryCache};
use am_harness::broker::{MemoryBroker, TaskBroker};
use am_session::manager::CommandExecutor;
use am_session::shell::{ExecResult, ShellError};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;
use crate::dispatch::TaskDispatcher;
use crate::event_bus::EventBus;
use crate::publisher::BusPublisher;

/// Answers `--version` for a fixed set of programs.
#[derive(Default)]
struct VersionProbe {
    calls: AtomicUsize,
}

#[async_trait]
impl CommandExecutor for VersionProbe {
    async fn execute(&self, _guid: &str, _command: &str, _timeout: Duration) -> ExecResult {
        ExecResult::completed(0, "", "")
    }

    async fn simple_execute(
        &self,
        _sub_path: &str,
        program: &str,
        _args: &[String],
        _timeout: Duration,
    ) -> ExecResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match program {
            "git" => ExecResult::completed(0, "git version 2.43.0\n", ""),
            "claude" => ExecResult::completed(0, "1.0.98 (Claude Code)", ""),
            "node" => ExecResult::completed(0, "v20.11.1", ""),
            other => ExecResult::failed(ShellError::Spawn {
                program: other.to_string(),
                cwd: ".".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}

fn app() -> (axum::Router, Arc<MemoryBroker>, Arc<VersionProbe>) {
    let bus = EventBus::new();
    let broker = Arc::new(MemoryBroker::default());
    let dispatcher = TaskDispatcher::new(
        broker.clone(),
        Arc::new(BusPublisher::new(bus.clone(), "agent:task:status")),
    );
    let probe = Arc::new(VersionProbe::default());
    let cache: Arc<dyn KvCache> = Arc::new(MemoryCache::new());
    let state = Arc::new(ApiState::new(
        dispatcher,
        bus,
        "agent:task:status",
        probe.clone(),
        cache,
    ));
    (api_router(state), broker, probe)
}

async fn call(router: &axum::Router, req: Request<Body>) -> Value {
    let response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn prd_route_enqueues_pm_turn() {
    let (router, broker, _) = app();
    let body = call(
        &router,
        post(
            "/api/v1/agent/pm/prd",
            json!({"projectGuid": "g-001", "requirements": "a todo app"}),
        ),
    )
    .await;
    assert_eq!(body["code"], 0);
    let task_id = body["data"]["taskId"].as_str().unwrap();

    let task = broker.dequeue().await.unwrap();
    assert_eq!(task.id, task_id);
    let payload: Value = serde_json::from_slice(&task.payload).unwrap();
    assert_eq!(payload["agentRole"], "pm");
    assert_eq!(payload["devStage"], "generate_prd");
    assert!(payload["message"].as_str().unwrap().starts_with("@bmad/pm.mdc"));
}

#[tokio::test]
async fn malformed_body_is_code_400_with_http_200() {
    let (router, broker, _) = app();
    let body = call(
        &router,
        post("/api/v1/agent/dev/fixbug", json!({"projectGuid": "g-001"})),
    )
    .await;
    assert_eq!(body["code"], 400);
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn unknown_task_is_code_404() {
    let (router, _, _) = app();
    let body = call(&router, get("/api/v1/tasks/nope")).await;
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn health_reports_available_tools_and_caches() {
    let (router, _, probe) = app();
    let body = call(&router, get("/api/v1/health")).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["status"], "running");
    let tools = body["data"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["node", "git", "claude-code"]);
    assert_eq!(tools[1]["version"], "2.43.0");
    assert_eq!(tools[2]["version"], "1.0.98");
    let probed = probe.calls.load(Ordering::SeqCst);
    assert_eq!(probed, 7);

    let body = call(&router, get("/api/v1/health")).await;
    assert!(body["message"].as_str().unwrap().contains("cached"));
    assert_eq!(probe.calls.load(Ordering::SeqCst), probed);
}

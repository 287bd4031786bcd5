mod support;

use am_agents::deploy::DeployError;
use am_core::types::{AgentRole, DeployPayload, DevStage, TaskStatus};
use support::Harness;

fn payload(guid: &str) -> DeployPayload {
    DeployPayload {
        project_guid: guid.into(),
        environment: "dev".into(),
        options: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn green_deploy_reports_build_then_run() {
    let h = Harness::new();
    h.executor.on("make run-dev", 0, "server listening on :8080\n", "");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::Deploy);
    let out = h.deploy().run(&payload("g-001"), &reporter).await.unwrap();
    assert_eq!(out, "server listening on :8080");
    assert_eq!(h.executor.lines(), vec!["make build-dev", "make run-dev"]);
    assert!(h.executor.calls().iter().all(|c| c.shell && c.dir == "g-001"));

    let events = h.drain();
    let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(progress, vec![0, 50, 100]);
    assert_eq!(events.last().unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn build_failure_asks_dev_to_repair() {
    let h = Harness::new();
    h.executor
        .on("make build-dev", 2, "", "./main.go:12: undefined: Foo")
        .on(
            "claude",
            0,
            r#"{"type":"result","is_error":false,"result":"defined Foo, build passes","session_id":"sid-7"}"#,
            "",
        )
        .on("git diff --cached --quiet", 1, "", "");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::Deploy);
    h.deploy().run(&payload("g-001"), &reporter).await.unwrap();

    let lines = h.executor.lines();
    let turn = lines.iter().find(|l| l.starts_with("claude")).unwrap();
    assert!(turn.contains("@bmad/dev.mdc"));
    assert!(turn.contains("make build-dev"));
    assert!(turn.contains("undefined: Foo"));
    assert_eq!(h.executor.count("git commit"), 1);
    assert_eq!(h.executor.count("make run-dev"), 1);
    assert_eq!(h.sessions.get("g-001", AgentRole::Dev).await, "sid-7");
    assert_eq!(h.drain().pop().unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn failed_repair_fails_deploy() {
    let h = Harness::new();
    h.executor
        .on("make build-dev", 2, "", "undefined: Foo")
        .on("claude", 1, "", "network unreachable");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::Deploy);
    let err = h.deploy().run(&payload("g-001"), &reporter).await.unwrap_err();
    assert!(matches!(err, DeployError::Repair { ref command, .. } if command == "make build-dev"));
    assert_eq!(h.executor.count("make run-dev"), 0);

    let last = h.drain().pop().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert!(last.message.contains("network unreachable"));
}

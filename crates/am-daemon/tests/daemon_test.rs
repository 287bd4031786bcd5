use std::sync::Arc;
use std::time::Duration;

use am_core::config::Config;
use am_daemon::daemon::Daemon;
use serde_json::{json, Value};

struct Running {
    base: String,
    daemon: Arc<Daemon>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    _dir: tempfile::TempDir,
}

async fn start_daemon() -> Running {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.app.workspace_path = dir.path().join("workspace").display().to_string();
    config.queue.concurrency = 4;
    config.queue.max_retry = 0;
    config.command.timeout_secs = 10;

    let daemon = Arc::new(Daemon::new(config).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let runner = daemon.clone();
    let handle = tokio::spawn(async move { runner.run_with_listener(listener).await });

    Running {
        base: format!("http://{addr}/api/v1"),
        daemon,
        handle,
        _dir: dir,
    }
}

#[tokio::test]
async fn new_creates_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    let root = dir.path().join("nested").join("workspace");
    config.app.workspace_path = root.display().to_string();
    Daemon::new(config).unwrap();
    assert!(root.is_dir());
}

#[tokio::test]
async fn task_runs_to_terminal_state_and_daemon_stops() {
    let running = start_daemon().await;
    let client = reqwest::Client::new();

    // The project tree does not exist, so the assistant cannot even start.
    let body: Value = client
        .post(format!("{}/agent/chat", running.base))
        .json(&json!({
            "projectGuid": "missing-project",
            "agentRole": "dev",
            "message": "hello",
            "cliTool": "qwen-code"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["code"], 0);
    let task_id = body["data"]["taskId"].as_str().unwrap().to_string();

    let mut status = String::new();
    for _ in 0..200 {
        let body: Value = client
            .get(format!("{}/tasks/{task_id}", running.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        status = body["data"]["status"].as_str().unwrap_or_default().to_string();
        if status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(status, "failed");

    running.daemon.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), running.handle)
        .await
        .expect("daemon did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn unknown_task_is_404_over_http() {
    let running = start_daemon().await;
    let body: Value = reqwest::get(format!("{}/tasks/does-not-exist", running.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["code"], 404);
    running.daemon.shutdown();
}

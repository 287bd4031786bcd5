mod support;

use std::sync::Arc;
use std::time::Duration;

use am_agents::handlers::AgentServices;
use am_bridge::dispatch::TaskDispatcher;
use am_core::types::{
    AgentExecutePayload, AgentRole, BroadcastPayload, DevStage, TaskKind, TaskStatus,
};
use am_harness::broker::{MemoryBroker, TaskBroker};
use am_harness::shutdown::ShutdownSignal;
use am_harness::task::{NewTask, TaskState};
use am_harness::worker::WorkerPool;
use support::Harness;

fn start(h: &Harness, broker: Arc<MemoryBroker>) -> ShutdownSignal {
    let services = AgentServices {
        pipeline: h.pipeline.clone(),
        bootstrapper: Arc::new(h.bootstrapper()),
        deploy: Arc::new(h.deploy()),
        publisher: h.publisher.clone(),
    };
    let pool = WorkerPool::new(broker, services.task_mux(), 4);
    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    tokio::spawn(async move { pool.run(signal, Duration::from_secs(1)).await });
    shutdown
}

async fn wait_for_state(broker: &MemoryBroker, id: &str, state: TaskState) {
    for _ in 0..200 {
        if broker.task_info(id).await.is_some_and(|i| i.state == state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached {state:?}");
}

#[tokio::test]
async fn chat_task_flows_from_pending_to_done() {
    let h = Harness::new();
    h.executor.on(
        "claude",
        0,
        r#"{"type":"result","is_error":false,"result":"hi there","session_id":"sid-1"}"#,
        "",
    );
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let dispatcher = TaskDispatcher::new(broker.clone(), h.publisher.clone());
    let shutdown = start(&h, broker.clone());

    let id = dispatcher
        .enqueue_chat(AgentExecutePayload {
            project_guid: "g-001".into(),
            agent_role: AgentRole::Pm,
            message: "@bmad/pm.mdc hello".into(),
            dev_stage: DevStage::GeneratePrd,
            cli_tool: None,
        })
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Done).await;
    shutdown.trigger();

    let events = h.drain();
    assert!(events.iter().all(|e| e.task_id == id));
    assert_eq!(events.first().unwrap().status, TaskStatus::Pending);
    let last = events.last().unwrap();
    assert_eq!(last.status, TaskStatus::Done);
    assert_eq!(last.agent_role, Some(AgentRole::Pm));
    assert_eq!(last.dev_stage, DevStage::GeneratePrd);

    let record = broker.task_info(&id).await.unwrap().current_result();
    assert_eq!(record.status, TaskStatus::Done);
    assert_eq!(record.message, "hi there");
}

#[tokio::test]
async fn assistant_error_is_published_verbatim() {
    let h = Harness::new();
    h.executor.on(
        "claude",
        0,
        r#"{"type":"result","is_error":true,"result":"quota exceeded","session_id":""}"#,
        "",
    );
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let dispatcher = TaskDispatcher::new(broker.clone(), h.publisher.clone());
    let shutdown = start(&h, broker.clone());

    let id = dispatcher
        .enqueue_chat(AgentExecutePayload {
            project_guid: "g-001".into(),
            agent_role: AgentRole::Dev,
            message: "hello".into(),
            dev_stage: DevStage::DevelopStory,
            cli_tool: None,
        })
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Failed).await;
    shutdown.trigger();

    let last = h.drain().pop().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert_eq!(last.message, "quota exceeded");
    assert_eq!(h.executor.count("git"), 0);
}

#[tokio::test]
async fn undecodable_payload_is_not_retried() {
    let h = Harness::new();
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let shutdown = start(&h, broker.clone());

    let id = broker
        .enqueue(NewTask::new(TaskKind::ProjectSetup, b"not json".to_vec()))
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Failed).await;
    shutdown.trigger();

    let info = broker.task_info(&id).await.unwrap();
    assert_eq!(info.retried, 0);
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn backup_kind_has_no_handler() {
    let h = Harness::new();
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let shutdown = start(&h, broker.clone());

    let id = broker
        .enqueue(NewTask::new(TaskKind::ProjectBackup, b"{}".to_vec()))
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Failed).await;
    shutdown.trigger();
    assert!(broker
        .task_info(&id)
        .await
        .unwrap()
        .last_error
        .unwrap()
        .contains("no handler"));
}

#[tokio::test]
async fn broadcast_task_reaches_subscribers() {
    let h = Harness::new();
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let dispatcher = TaskDispatcher::new(broker.clone(), h.publisher.clone());
    let shutdown = start(&h, broker.clone());

    let id = dispatcher
        .enqueue_broadcast(BroadcastPayload {
            project_guid: "g-001".into(),
            event: "file_changed".into(),
            data: serde_json::json!({"path": "docs/prd.md"}),
        })
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Done).await;
    shutdown.trigger();

    let broadcast = h
        .events
        .try_iter()
        .find_map(|m| match m {
            am_bridge::protocol::BridgeMessage::Broadcast(b) => Some(b),
            _ => None,
        })
        .unwrap();
    assert_eq!(broadcast.event, "file_changed");
    assert_eq!(broadcast.data["path"], "docs/prd.md");
}

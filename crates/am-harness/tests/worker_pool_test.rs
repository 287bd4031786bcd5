use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use am_core::types::TaskKind;
use am_harness::broker::{MemoryBroker, TaskBroker};
use am_harness::mux::{HandlerError, TaskContext, TaskHandler, TaskMux};
use am_harness::shutdown::ShutdownSignal;
use am_harness::task::{NewTask, TaskState};
use am_harness::worker::WorkerPool;
use async_trait::async_trait;

/// Sleeps, tracking how many invocations overlap.
#[derive(Default)]
struct Tracking {
    running: AtomicUsize,
    max_running: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl TaskHandler for Tracking {
    async fn handle(&self, _ctx: &TaskContext) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct AlwaysFails {
    calls: AtomicUsize,
    skip: bool,
}

#[async_trait]
impl TaskHandler for AlwaysFails {
    async fn handle(&self, _ctx: &TaskContext) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.skip {
            Err(HandlerError::skip_retry("permanent"))
        } else {
            Err(HandlerError::failed("transient"))
        }
    }
}

/// Tasks with a `hold` payload wait until the test releases them.
struct Gated {
    release: tokio::sync::Semaphore,
}

#[async_trait]
impl TaskHandler for Gated {
    async fn handle(&self, ctx: &TaskContext) -> Result<(), HandlerError> {
        if ctx.payload() == b"hold" {
            self.release
                .acquire()
                .await
                .map_err(HandlerError::failed)?
                .forget();
        }
        Ok(())
    }
}

struct Panics;

#[async_trait]
impl TaskHandler for Panics {
    async fn handle(&self, _ctx: &TaskContext) -> Result<(), HandlerError> {
        panic!("handler bug");
    }
}

fn start(
    broker: Arc<MemoryBroker>,
    mux: TaskMux,
    concurrency: usize,
) -> (ShutdownSignal, tokio::task::JoinHandle<()>) {
    let shutdown = ShutdownSignal::new();
    let pool = WorkerPool::new(broker, mux, concurrency);
    let s = shutdown.clone();
    let handle = tokio::spawn(async move { pool.run(s, Duration::from_secs(2)).await });
    (shutdown, handle)
}

async fn wait_for_state(broker: &MemoryBroker, id: &str, state: TaskState) {
    for _ in 0..200 {
        if broker.task_info(id).await.map(|i| i.state) == Some(state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached {state:?}");
}

#[tokio::test]
async fn tasks_run_to_done() {
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let handler = Arc::new(Tracking::default());
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentChat, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 4);

    let id = broker
        .enqueue(NewTask::new(TaskKind::AgentChat, b"{}".to_vec()))
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Done).await;
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = Arc::new(Tracking::default());
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentChat, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 2);

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(
            broker
                .enqueue(NewTask::new(TaskKind::AgentChat, b"{}".to_vec()))
                .await
                .unwrap(),
        );
    }
    for id in &ids {
        wait_for_state(&broker, id, TaskState::Done).await;
    }
    assert_eq!(handler.max_running.load(Ordering::SeqCst), 2);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn same_project_tasks_never_overlap() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = Arc::new(Tracking::default());
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentChat, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 8);

    let mut ids = Vec::new();
    for _ in 0..4 {
        let task = NewTask::new(TaskKind::AgentChat, b"{}".to_vec()).group("g-001");
        ids.push(broker.enqueue(task).await.unwrap());
    }
    for id in &ids {
        wait_for_state(&broker, id, TaskState::Done).await;
    }
    assert_eq!(handler.max_running.load(Ordering::SeqCst), 1);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn different_projects_overlap() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = Arc::new(Tracking::default());
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentChat, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 8);

    let a = broker
        .enqueue(NewTask::new(TaskKind::AgentChat, b"{}".to_vec()).group("a"))
        .await
        .unwrap();
    let b = broker
        .enqueue(NewTask::new(TaskKind::AgentChat, b"{}".to_vec()).group("b"))
        .await
        .unwrap();
    wait_for_state(&broker, &a, TaskState::Done).await;
    wait_for_state(&broker, &b, TaskState::Done).await;
    assert_eq!(handler.max_running.load(Ordering::SeqCst), 2);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn busy_project_backlog_leaves_slots_for_others() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = Arc::new(Gated {
        release: tokio::sync::Semaphore::new(0),
    });
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentChat, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 2);

    let mut held = Vec::new();
    for _ in 0..3 {
        let task = NewTask::new(TaskKind::AgentChat, b"hold".to_vec()).group("p");
        held.push(broker.enqueue(task).await.unwrap());
    }
    let other = broker
        .enqueue(NewTask::new(TaskKind::AgentChat, b"{}".to_vec()).group("q"))
        .await
        .unwrap();

    wait_for_state(&broker, &other, TaskState::Done).await;
    for id in &held {
        let state = broker.task_info(id).await.unwrap().state;
        assert_ne!(state, TaskState::Done);
    }

    handler.release.add_permits(held.len());
    for id in &held {
        wait_for_state(&broker, id, TaskState::Done).await;
    }

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn parked_task_is_failed_on_shutdown() {
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let handler = Arc::new(Gated {
        release: tokio::sync::Semaphore::new(0),
    });
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentChat, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 2);

    let running = broker
        .enqueue(NewTask::new(TaskKind::AgentChat, b"hold".to_vec()).group("p"))
        .await
        .unwrap();
    let parked = broker
        .enqueue(
            NewTask::new(TaskKind::AgentChat, b"hold".to_vec())
                .group("p")
                .max_retry(0),
        )
        .await
        .unwrap();
    wait_for_state(&broker, &running, TaskState::Running).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown.trigger();
    wait_for_state(&broker, &parked, TaskState::Failed).await;
    let info = broker.task_info(&parked).await.unwrap();
    assert_eq!(info.last_error.as_deref(), Some("worker pool shut down"));

    handler.release.add_permits(1);
    handle.await.unwrap();
}

#[tokio::test]
async fn failing_task_is_retried_once() {
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let handler = Arc::new(AlwaysFails {
        calls: AtomicUsize::new(0),
        skip: false,
    });
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentExecute, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 4);

    let id = broker
        .enqueue(NewTask::new(TaskKind::AgentExecute, b"{}".to_vec()))
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Failed).await;
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    let info = broker.task_info(&id).await.unwrap();
    assert_eq!(info.retried, 1);
    assert_eq!(info.last_error.as_deref(), Some("transient"));

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn skip_retry_runs_once() {
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let handler = Arc::new(AlwaysFails {
        calls: AtomicUsize::new(0),
        skip: true,
    });
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentExecute, handler.clone());
    let (shutdown, handle) = start(broker.clone(), mux, 4);

    let id = broker
        .enqueue(NewTask::new(TaskKind::AgentExecute, b"{}".to_vec()).max_retry(3))
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Failed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn panicking_handler_fails_task() {
    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    let mut mux = TaskMux::new();
    mux.handle(TaskKind::AgentExecute, Arc::new(Panics));
    let (shutdown, handle) = start(broker.clone(), mux, 4);

    let id = broker
        .enqueue(NewTask::new(TaskKind::AgentExecute, b"{}".to_vec()).max_retry(0))
        .await
        .unwrap();
    wait_for_state(&broker, &id, TaskState::Failed).await;

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn shutdown_stops_pool() {
    let broker = Arc::new(MemoryBroker::default());
    let (shutdown, handle) = start(broker, TaskMux::new(), 4);
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

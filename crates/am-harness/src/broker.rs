use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use am_core::types::TaskKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::task::{NewTask, QueueName, Task, TaskId, TaskInfo, TaskResult, TaskState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker is closed")]
    Closed,

    #[error("task payload could not be encoded: {0}")]
    Encode(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// What the broker did with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Scheduled again; `attempt` is the number of retries so far.
    Retrying { attempt: u32 },
    /// No retries left, or retry was skipped.
    Dead,
}

// ---------------------------------------------------------------------------
// TaskBroker trait
// ---------------------------------------------------------------------------

/// At-least-once task intake with per-task result records.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    async fn enqueue(&self, task: NewTask) -> Result<TaskId>;

    /// Wait for the next runnable task. `None` once the broker is closed.
    async fn dequeue(&self) -> Option<Task>;

    async fn complete(&self, id: &str) -> Result<()>;

    async fn fail(&self, id: &str, error: &str, skip_retry: bool) -> Result<FailOutcome>;

    async fn write_result(&self, result: TaskResult) -> Result<()>;

    async fn task_info(&self, id: &str) -> Option<TaskInfo>;

    /// Stop handing out tasks and reject new ones.
    async fn close(&self);
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

struct Record {
    task: Task,
    state: TaskState,
    last_error: Option<String>,
    result: Option<TaskResult>,
    enqueued_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    expires_at: Option<Instant>,
}

impl Record {
    fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.task.id.clone(),
            kind: self.task.kind,
            queue: self.task.options.queue,
            state: self.state,
            retried: self.task.retried,
            max_retry: self.task.options.max_retry,
            last_error: self.last_error.clone(),
            result: self.result.clone(),
            enqueued_at: self.enqueued_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Default)]
struct Inner {
    queues: [VecDeque<TaskId>; 3],
    /// Smooth weighted round-robin state, one slot per queue.
    current_weight: [i64; 3],
    scheduled: Vec<(Instant, TaskId)>,
    records: HashMap<TaskId, Record>,
    closed: bool,
}

impl Inner {
    fn promote_due(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.scheduled.len() {
            if self.scheduled[i].0 <= now {
                let (_, id) = self.scheduled.swap_remove(i);
                if let Some(rec) = self.records.get(&id) {
                    self.queues[rec.task.options.queue.index()].push_back(id);
                }
            } else {
                i += 1;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.scheduled.iter().map(|(at, _)| *at).min()
    }

    fn pick_queue(&mut self) -> Option<usize> {
        let mut total = 0;
        let mut best: Option<usize> = None;
        for q in QueueName::ALL {
            let i = q.index();
            if self.queues[i].is_empty() {
                continue;
            }
            self.current_weight[i] += q.weight();
            total += q.weight();
            if best.is_none_or(|b| self.current_weight[i] > self.current_weight[b]) {
                best = Some(i);
            }
        }
        let best = best?;
        self.current_weight[best] -= total;
        Some(best)
    }

    fn pop(&mut self) -> Option<Task> {
        while let Some(i) = self.pick_queue() {
            let Some(id) = self.queues[i].pop_front() else {
                continue;
            };
            if let Some(rec) = self.records.get_mut(&id) {
                rec.state = TaskState::Running;
                return Some(rec.task.clone());
            }
        }
        None
    }
}

/// In-process broker: three weighted queues, delayed retries and result
/// records kept for each task's retention window after it finishes.
pub struct MemoryBroker {
    inner: Mutex<Inner>,
    notify: Notify,
    retry_delay: Duration,
}

impl MemoryBroker {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            retry_delay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("broker lock was poisoned, recovering");
            e.into_inner()
        })
    }

    /// Drop terminal records whose retention has elapsed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.records.len();
        inner
            .records
            .retain(|_, rec| rec.expires_at.is_none_or(|at| at > now));
        let purged = before - inner.records.len();
        if purged > 0 {
            debug!(purged, "expired task records removed");
        }
        purged
    }

    /// Tasks waiting in a queue or for a retry.
    pub fn pending_count(&self) -> usize {
        let inner = self.lock();
        inner.queues.iter().map(VecDeque::len).sum::<usize>() + inner.scheduled.len()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    fn finish(&self, id: &str, state: TaskState, error: Option<&str>) -> Result<()> {
        let mut inner = self.lock();
        let rec = inner
            .records
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        rec.state = state;
        rec.last_error = error.map(str::to_string).or(rec.last_error.take());
        rec.completed_at = Some(Utc::now());
        rec.expires_at = Some(Instant::now() + rec.task.options.retention);
        Ok(())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl TaskBroker for MemoryBroker {
    async fn enqueue(&self, task: NewTask) -> Result<TaskId> {
        let id = Uuid::new_v4().to_string();
        let kind: TaskKind = task.kind;
        let queue = task.options.queue;
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }
            let record = Record {
                task: Task {
                    id: id.clone(),
                    kind: task.kind,
                    payload: task.payload.into(),
                    options: task.options,
                    retried: 0,
                },
                state: TaskState::Queued,
                last_error: None,
                result: None,
                enqueued_at: Utc::now(),
                completed_at: None,
                expires_at: None,
            };
            inner.records.insert(id.clone(), record);
            inner.queues[queue.index()].push_back(id.clone());
        }
        self.notify.notify_one();
        debug!(task_id = %id, %kind, ?queue, "task enqueued");
        Ok(id)
    }

    async fn dequeue(&self) -> Option<Task> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                inner.promote_due(Instant::now());
                if let Some(task) = inner.pop() {
                    return Some(task);
                }
                inner.next_due()
            };

            match next_due {
                Some(at) => {
                    let _ = tokio::time::timeout_at(at.into(), notified).await;
                }
                None => notified.await,
            }
        }
    }

    async fn complete(&self, id: &str) -> Result<()> {
        self.finish(id, TaskState::Done, None)
    }

    async fn fail(&self, id: &str, error: &str, skip_retry: bool) -> Result<FailOutcome> {
        let outcome = {
            let mut inner = self.lock();
            let closed = inner.closed;
            let rec = inner
                .records
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            if skip_retry || closed || rec.task.retried >= rec.task.options.max_retry {
                None
            } else {
                rec.task.retried += 1;
                rec.state = TaskState::Retry;
                rec.last_error = Some(error.to_string());
                Some(rec.task.retried)
            }
        };

        match outcome {
            Some(attempt) => {
                let at = Instant::now() + self.retry_delay;
                self.lock().scheduled.push((at, id.to_string()));
                self.notify.notify_one();
                info!(task_id = id, attempt, error, "task scheduled for retry");
                Ok(FailOutcome::Retrying { attempt })
            }
            None => {
                self.finish(id, TaskState::Failed, Some(error))?;
                warn!(task_id = id, error, skip_retry, "task failed");
                Ok(FailOutcome::Dead)
            }
        }
    }

    async fn write_result(&self, result: TaskResult) -> Result<()> {
        let mut inner = self.lock();
        let rec = inner
            .records
            .get_mut(&result.task_id)
            .ok_or_else(|| QueueError::NotFound(result.task_id.clone()))?;
        rec.result = Some(result);
        Ok(())
    }

    async fn task_info(&self, id: &str) -> Option<TaskInfo> {
        self.lock().records.get(id).map(Record::info)
    }

    async fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        info!("task broker closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::broker::{FailOutcome, TaskBroker};
use crate::mux::{HandlerError, TaskContext, TaskMux};
use crate::project_lock::ProjectLocks;
use crate::shutdown::ShutdownSignal;
use crate::task::Task;

/// Default number of tasks allowed to run at once.
const DEFAULT_CONCURRENCY: usize = 100;

/// Pulls tasks from a broker and runs them through a [`TaskMux`].
///
/// Concurrency is bounded by a [`Semaphore`]: a permit is acquired before
/// each dequeue and released when the handler returns. Tasks carrying a
/// group key additionally take the matching [`ProjectLocks`] guard. A task
/// whose project is busy gives its permit back and waits for the lock
/// first, so one project's backlog never occupies slots other projects
/// could use.
pub struct WorkerPool {
    broker: Arc<dyn TaskBroker>,
    mux: Arc<TaskMux>,
    locks: ProjectLocks,
    concurrency_gate: Arc<Semaphore>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(broker: Arc<dyn TaskBroker>, mux: TaskMux, concurrency: usize) -> Self {
        let limit = if concurrency == 0 {
            warn!("concurrency was 0, defaulting to {DEFAULT_CONCURRENCY}");
            DEFAULT_CONCURRENCY
        } else {
            concurrency
        };
        Self {
            broker,
            mux: Arc::new(mux),
            locks: ProjectLocks::new(),
            concurrency_gate: Arc::new(Semaphore::new(limit)),
            concurrency: limit,
        }
    }

    pub fn project_locks(&self) -> &ProjectLocks {
        &self.locks
    }

    /// Number of worker slots currently free.
    pub fn available_slots(&self) -> usize {
        self.concurrency_gate.available_permits()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Dequeue and run tasks until `shutdown` fires or the broker closes,
    /// then wait up to `drain_timeout` for in-flight tasks.
    pub async fn run(&self, shutdown: ShutdownSignal, drain_timeout: Duration) {
        info!(concurrency = self.concurrency, "worker pool started");
        loop {
            let permit = tokio::select! {
                _ = shutdown.triggered() => break,
                permit = self.concurrency_gate.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            let task = tokio::select! {
                _ = shutdown.triggered() => break,
                task = self.broker.dequeue() => match task {
                    Some(t) => t,
                    None => break,
                },
            };
            self.dispatch(task, permit, &shutdown);
        }

        info!("worker pool draining");
        let all = self.concurrency as u32;
        match tokio::time::timeout(drain_timeout, self.concurrency_gate.acquire_many(all)).await {
            Ok(_) => info!("worker pool drained"),
            Err(_) => warn!(
                in_flight = self.concurrency - self.available_slots(),
                "drain timeout, abandoning in-flight tasks"
            ),
        }
    }

    fn dispatch(&self, task: Task, permit: OwnedSemaphorePermit, shutdown: &ShutdownSignal) {
        let broker = self.broker.clone();
        let mux = self.mux.clone();

        let Some(key) = task.options.group_key.clone() else {
            tokio::spawn(async move {
                let _permit = permit;
                process(task, broker, mux).await;
            });
            return;
        };

        if let Some(guard) = self.locks.try_lock(&key) {
            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                process(task, broker, mux).await;
            });
            return;
        }

        drop(permit);
        debug!(task_id = %task.id, project_guid = %key, "project busy, parking task");
        let locks = self.locks.clone();
        let gate = self.concurrency_gate.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let ready = tokio::select! {
                _ = shutdown.triggered() => None,
                ready = lock_then_permit(&locks, &key, gate) => ready,
            };
            match ready {
                Some((_guard, _permit)) => process(task, broker, mux).await,
                None => {
                    warn!(task_id = %task.id, project_guid = %key, "pool stopped before parked task ran");
                    if let Err(e) = broker.fail(&task.id, "worker pool shut down", false).await {
                        warn!(task_id = %task.id, error = %e, "failed to record task outcome");
                    }
                }
            }
        });
    }
}

/// Project lock first, worker slot second. `None` once the gate is closed.
async fn lock_then_permit(
    locks: &ProjectLocks,
    key: &str,
    gate: Arc<Semaphore>,
) -> Option<(OwnedMutexGuard<()>, OwnedSemaphorePermit)> {
    let guard = locks.lock(key).await;
    let permit = gate.acquire_owned().await.ok()?;
    Some((guard, permit))
}

async fn process(task: Task, broker: Arc<dyn TaskBroker>, mux: Arc<TaskMux>) {
    let id = task.id.clone();
    let kind = task.kind;

    debug!(task_id = %id, %kind, attempt = task.retried, "task started");
    let ctx = TaskContext::new(task, broker.clone());
    let outcome = {
        // Run the handler on its own task so a panic becomes a task failure.
        let handle = tokio::spawn(async move { mux.route(&ctx).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                error!(task_id = %id, error = %join_err, "task handler panicked");
                Err(HandlerError::failed(format!("handler panicked: {join_err}")))
            }
        }
    };

    let recorded = match outcome {
        Ok(()) => broker.complete(&id).await.map(|_| ()),
        Err(e) => match broker.fail(&id, &e.to_string(), e.is_skip_retry()).await {
            Ok(FailOutcome::Retrying { attempt }) => {
                debug!(task_id = %id, attempt, "task will be retried");
                Ok(())
            }
            Ok(FailOutcome::Dead) => Ok(()),
            Err(err) => Err(err),
        },
    };
    if let Err(e) = recorded {
        warn!(task_id = %id, error = %e, "failed to record task outcome");
    }
}

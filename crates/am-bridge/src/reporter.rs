use std::sync::{Arc, Mutex, MutexGuard};

use am_core::types::{AgentRole, AgentTaskStatusMessage, DevStage, TaskStatus};
use am_harness::mux::{ResultWriter, TaskContext};
use chrono::Utc;
use tracing::{debug, warn};

use crate::publisher::EventPublisher;

#[derive(Debug, Default)]
struct ReportState {
    progress: u8,
    finished: bool,
}

/// Publishes the lifecycle of one task attempt.
///
/// Progress never decreases, including across retries: a reporter built by
/// [`for_task`](TaskReporter::for_task) starts from the progress recorded
/// by the previous attempt. At most one terminal event is published, and a
/// failure on an attempt that will be retried is reported as `in_progress`
/// so subscribers only ever see the terminal status of the last attempt.
///
/// Every report is also written to the task's result record when one is
/// attached. Publish and write failures are logged and swallowed.
pub struct TaskReporter {
    publisher: Arc<dyn EventPublisher>,
    writer: Option<ResultWriter>,
    task_id: String,
    project_guid: String,
    agent_role: Option<AgentRole>,
    dev_stage: DevStage,
    final_attempt: bool,
    state: Mutex<ReportState>,
}

impl TaskReporter {
    /// Reporter bound to a running task's result record.
    pub async fn for_task(
        ctx: &TaskContext,
        publisher: Arc<dyn EventPublisher>,
        project_guid: impl Into<String>,
        agent_role: Option<AgentRole>,
        dev_stage: DevStage,
    ) -> Self {
        let writer = ctx.result_writer();
        let progress = writer.last_progress().await;
        Self {
            publisher,
            writer: Some(writer),
            task_id: ctx.id().to_string(),
            project_guid: project_guid.into(),
            agent_role,
            dev_stage,
            final_attempt: ctx.is_final_attempt(),
            state: Mutex::new(ReportState {
                progress,
                finished: false,
            }),
        }
    }

    /// Reporter that only publishes; every attempt is treated as final.
    pub fn detached(
        publisher: Arc<dyn EventPublisher>,
        task_id: impl Into<String>,
        project_guid: impl Into<String>,
        agent_role: Option<AgentRole>,
        dev_stage: DevStage,
    ) -> Self {
        Self {
            publisher,
            writer: None,
            task_id: task_id.into(),
            project_guid: project_guid.into(),
            agent_role,
            dev_stage,
            final_attempt: true,
            state: Mutex::new(ReportState::default()),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn project_guid(&self) -> &str {
        &self.project_guid
    }

    pub fn current_progress(&self) -> u8 {
        self.state().progress
    }

    /// Whether a terminal event has been published.
    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    pub async fn started(&self, message: &str) {
        let progress = self.current_progress();
        self.report(TaskStatus::InProgress, progress, message).await;
    }

    pub async fn progress(&self, progress: u8, message: &str) {
        self.report(TaskStatus::InProgress, progress, message).await;
    }

    pub async fn done(&self, message: &str) {
        self.report(TaskStatus::Done, 100, message).await;
    }

    pub async fn failed(&self, message: &str) {
        let progress = self.current_progress();
        self.report(TaskStatus::Failed, progress, message).await;
    }

    fn state(&self) -> MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn report(&self, status: TaskStatus, progress: u8, message: &str) {
        let (status, progress, message) = {
            let mut state = self.state();
            if state.finished {
                debug!(task_id = %self.task_id, ?status, "task already finished, report dropped");
                return;
            }
            state.progress = state.progress.max(progress.min(100));
            let (status, message) = match status {
                TaskStatus::Failed if !self.final_attempt => {
                    (TaskStatus::InProgress, format!("retrying: {message}"))
                }
                other => (other, message.to_string()),
            };
            if status.is_terminal() {
                state.finished = true;
            }
            (status, state.progress, message)
        };

        if let Some(writer) = &self.writer {
            writer.write(status, progress, &message).await;
        }

        let event = AgentTaskStatusMessage {
            task_id: self.task_id.clone(),
            project_guid: self.project_guid.clone(),
            agent_role: self.agent_role,
            status,
            dev_stage: self.dev_stage,
            message,
            progress,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(event.into()).await {
            warn!(task_id = %self.task_id, error = %e, "failed to publish task status");
        }
    }
}

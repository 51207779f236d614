use crate::backend_flow::BackendOrchestrator;
use pictor_common::{Error, RawTaskStatus, Result, TaskPoll};
use pictor_providers::BackendRegistry;
use std::sync::Arc;

pub struct TaskOrchestrator {
    registry: Arc<dyn BackendRegistry>,
    backends: Arc<BackendOrchestrator>,
}

impl TaskOrchestrator {
    pub fn new(registry: Arc<dyn BackendRegistry>, backends: Arc<BackendOrchestrator>) -> Self {
        Self { registry, backends }
    }

    /// Ensure a usable backend, submit the opaque workflow payload, return
    /// the task id. A failure names its stage and keeps the cause attached;
    /// nothing already provisioned is torn down, it stays for the next
    /// attempt.
    pub async fn submit_base_workflow(&self, workflow: &serde_json::Value) -> Result<String> {
        let backend = self
            .backends
            .ensure_backend()
            .await
            .map_err(|e| Error::stage("ensure-backend", e))?;
        eprintln!("🔵 [task-flow] Submitting workflow via backend {}", backend);
        let task_id = self
            .registry
            .submit_workflow(workflow)
            .await
            .map_err(|e| Error::stage("submit-workflow", e))?;
        eprintln!("✅ [task-flow] Workflow accepted, task {}", task_id);
        Ok(task_id)
    }

    /// Single-shot status fetch. Never loops; callers own the re-poll
    /// cadence and its deadline.
    pub async fn poll_task(&self, task_id: &str) -> Result<TaskPoll> {
        let raw = self.registry.task_state(task_id).await?;
        classify_task(raw)
    }
}

/// The one task-state rule set. Any status transport (polling today, a push
/// channel if one is ever added) must classify through here.
pub fn classify_task(raw: RawTaskStatus) -> Result<TaskPoll> {
    if raw.code != 0 {
        return Err(Error::Protocol(format!(
            "task status code {}: {}",
            raw.code,
            raw.msg.as_deref().unwrap_or("no message")
        )));
    }
    let state = raw
        .state
        .ok_or_else(|| Error::Protocol("task status code 0 without task data".into()))?;
    if state.status == "finished" && state.message == "success" {
        return Ok(TaskPoll::Finished(state.images));
    }
    Ok(TaskPoll::NotReady {
        status: state.status,
        message: state.message,
    })
}

use pictor_common::TaskPoll;
use pictor_orchestrator::alerts::WebhookAlertSink;
use pictor_orchestrator::backend_flow::BackendOrchestrator;
use pictor_orchestrator::config::Settings;
use pictor_orchestrator::instance_flow::{InstanceOptions, InstanceOrchestrator};
use pictor_orchestrator::state_machine::{wait_until, WaitOutcome, WaitPlan};
use pictor_orchestrator::task_flow::TaskOrchestrator;
use pictor_providers::compute::HttpComputeProvider;
use pictor_providers::registry::HttpBackendRegistry;
use pictor_providers::{BackendRegistry, ComputeProvider};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let compute: Arc<dyn ComputeProvider> =
        Arc::new(HttpComputeProvider::new(settings.compute.clone()));
    let registry: Arc<dyn BackendRegistry> =
        Arc::new(HttpBackendRegistry::new(settings.backend.clone()));
    let alerts = Arc::new(WebhookAlertSink::new(settings.alert_webhook_url.clone()));

    let mut opts = InstanceOptions::default();
    if let Some(list) = settings.gpu_allow_list.clone() {
        opts.gpu_allow_list = list;
    }
    let instances = Arc::new(InstanceOrchestrator::new(compute, alerts, opts));

    let app_image_id = match settings.app_image_id.clone() {
        Some(id) => id,
        None => instances.resolve_default_image().await?,
    };
    tracing::info!(%app_image_id, "orchestrating render fleet");

    let backends = Arc::new(BackendOrchestrator::new(
        registry.clone(),
        instances,
        app_image_id,
    ));
    let tasks = TaskOrchestrator::new(registry, backends);

    // The workflow template is an external artifact; here it is just a file
    // of opaque JSON that gets submitted as-is.
    let template = std::fs::read_to_string(&settings.workflow_template_path)
        .map_err(|e| anyhow::anyhow!("{}: {}", settings.workflow_template_path, e))?;
    let workflow: serde_json::Value = serde_json::from_str(&template)?;

    let task_id = tasks.submit_base_workflow(&workflow).await?;
    tracing::info!(%task_id, "workflow submitted");

    // poll_task never loops internally; the caller owns cadence and deadline.
    let tasks_ref = &tasks;
    let tid = task_id.as_str();
    let plan = WaitPlan::new(Duration::from_secs(3), Duration::from_secs(1800));
    let outcome = wait_until(plan, || async move {
        match tasks_ref.poll_task(tid).await? {
            TaskPoll::Finished(images) => Ok(Some(images)),
            TaskPoll::NotReady { status, message } => {
                eprintln!("🔍 [task-flow] Task {} not ready: {} {}", tid, status, message);
                Ok(None)
            }
        }
    })
    .await?;

    match outcome {
        WaitOutcome::Ready(images) => {
            tracing::info!(count = images.len(), "task finished");
            for url in &images {
                println!("{}", url);
            }
            Ok(())
        }
        WaitOutcome::TimedOut { waited } => {
            anyhow::bail!("task {} still unfinished after {:?}", task_id, waited)
        }
    }
}

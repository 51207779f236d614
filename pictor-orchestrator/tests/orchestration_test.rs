// End-to-end orchestration behavior against the in-memory mock control
// planes. Poll intervals are shrunk so nothing here sleeps for real.

use async_trait::async_trait;
use pictor_common::{Error, RawTaskStatus, TaskPoll, TaskState};
use pictor_orchestrator::alerts::AlertSink;
use pictor_orchestrator::backend_flow::BackendOrchestrator;
use pictor_orchestrator::instance_flow::{InstanceOptions, InstanceOrchestrator};
use pictor_orchestrator::task_flow::TaskOrchestrator;
use pictor_providers::mock::{MockBackendRegistry, MockComputeProvider};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const IMAGE: &str = "img-render";

#[derive(Default)]
struct CountingAlertSink {
    alerts: AtomicUsize,
}

impl CountingAlertSink {
    fn count(&self) -> usize {
        self.alerts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertSink for CountingAlertSink {
    async fn notify(&self, _text: &str) {
        self.alerts.fetch_add(1, Ordering::SeqCst);
    }
}

fn fast_opts() -> InstanceOptions {
    InstanceOptions {
        poll_interval: Duration::from_millis(1),
        acquire_deadline: Duration::from_secs(2),
        release_deadline: Duration::from_secs(2),
        ..InstanceOptions::default()
    }
}

fn instance_orchestrator(
    compute: &Arc<MockComputeProvider>,
    sink: &Arc<CountingAlertSink>,
) -> Arc<InstanceOrchestrator> {
    Arc::new(InstanceOrchestrator::new(
        compute.clone(),
        sink.clone(),
        fast_opts(),
    ))
}

#[tokio::test]
async fn releasing_an_unknown_id_is_a_noop_success() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("unrelated", IMAGE, &[300]);

    let flow = instance_orchestrator(&compute, &sink);
    flow.release_instance("ghost").await.unwrap();

    assert_eq!(compute.stop_calls.load(Ordering::SeqCst), 0);
    assert_eq!(compute.delete_calls.load(Ordering::SeqCst), 0);
    assert_eq!(compute.instance_ids(), vec!["unrelated".to_string()]);
}

#[tokio::test]
async fn acquire_prefers_the_running_instance_over_a_stopped_one() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst-stopped", IMAGE, &[800]);
    compute.add_instance("inst-running", IMAGE, &[300]);

    let flow = instance_orchestrator(&compute, &sink);
    let id = flow.acquire_instance(IMAGE).await.unwrap();

    assert_eq!(id, "inst-running");
    assert_eq!(compute.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(compute.delete_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn booting_instance_is_polled_exactly_until_it_runs() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    // One status code per list call: BOOTING, BOOTING, RUNNING.
    compute.add_instance("inst-boot", IMAGE, &[100, 100, 300]);

    let flow = instance_orchestrator(&compute, &sink);
    let id = flow.acquire_instance(IMAGE).await.unwrap();

    assert_eq!(id, "inst-boot");
    assert_eq!(compute.list_instance_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn provisioning_skips_offers_without_free_units() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_offer("NVIDIA-GEFORCE-RTX-4090", "region-a", 0);
    compute.add_offer("NVIDIA-GEFORCE-RTX-3090", "region-b", 2);

    let flow = instance_orchestrator(&compute, &sink);
    let id = flow.acquire_instance(IMAGE).await.unwrap();

    let req = compute.last_create_request().unwrap();
    assert_eq!(req.gpu_type, "NVIDIA-GEFORCE-RTX-3090");
    assert_eq!(req.region_id, "region-b");
    assert_eq!(req.gpu_num, 1);
    assert!(compute.instance_ids().contains(&id));
}

#[tokio::test]
async fn no_allow_listed_capacity_fails_with_no_capacity() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_offer("NVIDIA-GEFORCE-RTX-4090", "region-a", 0);
    compute.add_offer("NVIDIA-A100", "region-b", 4);

    let flow = instance_orchestrator(&compute, &sink);
    let err = flow.acquire_instance(IMAGE).await.unwrap_err();
    assert!(matches!(err, Error::NoCapacity));
    assert_eq!(compute.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stopped_instance_is_released_and_a_fresh_one_provisioned() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst-old", IMAGE, &[800]);
    compute.add_offer("NVIDIA-GEFORCE-RTX-4090", "region-a", 1);

    let flow = instance_orchestrator(&compute, &sink);
    let id = flow.acquire_instance(IMAGE).await.unwrap();

    assert_ne!(id, "inst-old");
    assert_eq!(compute.delete_calls.load(Ordering::SeqCst), 1);
    assert_eq!(compute.create_calls.load(Ordering::SeqCst), 1);
    assert!(!compute.instance_ids().contains(&"inst-old".to_string()));
}

#[tokio::test]
async fn releasing_a_running_instance_stops_then_deletes() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst", IMAGE, &[300]);

    let flow = instance_orchestrator(&compute, &sink);
    flow.release_instance("inst").await.unwrap();

    assert_eq!(compute.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(compute.delete_calls.load(Ordering::SeqCst), 1);
    assert!(compute.instance_ids().is_empty());
}

#[tokio::test]
async fn low_balance_raises_exactly_one_alert() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst", IMAGE, &[300]);
    compute.set_balance(19.99);

    let flow = instance_orchestrator(&compute, &sink);
    flow.acquire_instance(IMAGE).await.unwrap();
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn threshold_balance_raises_no_alert() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst", IMAGE, &[300]);
    compute.set_balance(20.0);

    let flow = instance_orchestrator(&compute, &sink);
    flow.acquire_instance(IMAGE).await.unwrap();
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn stale_registration_is_replaced_never_repaired() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst-a", IMAGE, &[300]);

    let registry = Arc::new(MockBackendRegistry::new());
    registry.add_backend("stale", false, false, "running");

    let backends = BackendOrchestrator::new(
        registry.clone(),
        instance_orchestrator(&compute, &sink),
        IMAGE,
    );
    let name = backends.ensure_backend().await.unwrap();

    assert_ne!(name, "stale");
    assert_eq!(registry.deregister_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.backend_names(), vec![name.clone()]);
    assert_eq!(registry.registrations(), vec![(name, "inst-a".to_string())]);
}

#[tokio::test]
async fn usable_registration_is_returned_unchanged() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    let registry = Arc::new(MockBackendRegistry::new());
    registry.add_backend("good", true, false, "running");

    let backends = BackendOrchestrator::new(
        registry.clone(),
        instance_orchestrator(&compute, &sink),
        IMAGE,
    );
    let name = backends.ensure_backend().await.unwrap();

    assert_eq!(name, "good");
    assert_eq!(registry.register_calls.load(Ordering::SeqCst), 0);
    assert_eq!(compute.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_ensure_backend_converges_on_one_registration() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst-a", IMAGE, &[300]);

    let registry = Arc::new(MockBackendRegistry::new());
    let backends = Arc::new(BackendOrchestrator::new(
        registry.clone(),
        instance_orchestrator(&compute, &sink),
        IMAGE,
    ));

    let (a, b) = tokio::join!(backends.ensure_backend(), backends.ensure_backend());
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(registry.register_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn submit_then_poll_round_trips_through_the_backend() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    compute.add_image(IMAGE);
    compute.add_instance("inst-a", IMAGE, &[300]);

    let registry = Arc::new(MockBackendRegistry::new());
    let backends = Arc::new(BackendOrchestrator::new(
        registry.clone(),
        instance_orchestrator(&compute, &sink),
        IMAGE,
    ));
    let tasks = TaskOrchestrator::new(registry.clone(), backends);

    let task_id = tasks
        .submit_base_workflow(&json!({ "nodes": [] }))
        .await
        .unwrap();
    assert_eq!(registry.submitted_workflows().len(), 1);

    registry.set_task_state(
        &task_id,
        RawTaskStatus {
            code: 0,
            msg: None,
            state: Some(TaskState {
                status: "running".into(),
                message: "".into(),
                images: vec![],
            }),
        },
    );
    assert!(matches!(
        tasks.poll_task(&task_id).await.unwrap(),
        TaskPoll::NotReady { .. }
    ));

    registry.set_task_state(
        &task_id,
        RawTaskStatus {
            code: 0,
            msg: None,
            state: Some(TaskState {
                status: "finished".into(),
                message: "success".into(),
                images: vec!["out.png".into()],
            }),
        },
    );
    assert_eq!(
        tasks.poll_task(&task_id).await.unwrap(),
        TaskPoll::Finished(vec!["out.png".to_string()])
    );
}

#[tokio::test]
async fn submission_failure_names_the_failing_stage() {
    let compute = Arc::new(MockComputeProvider::new());
    let sink = Arc::new(CountingAlertSink::default());
    // No image configured: acquisition inside ensure-backend must fail.
    let registry = Arc::new(MockBackendRegistry::new());
    let backends = Arc::new(BackendOrchestrator::new(
        registry.clone(),
        instance_orchestrator(&compute, &sink),
        IMAGE,
    ));
    let tasks = TaskOrchestrator::new(registry.clone(), backends);

    let err = tasks
        .submit_base_workflow(&json!({ "nodes": [] }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ensure-backend"));
    // Nothing was submitted and nothing gets torn down.
    assert!(registry.submitted_workflows().is_empty());
    assert_eq!(registry.deregister_calls.load(Ordering::SeqCst), 0);
}

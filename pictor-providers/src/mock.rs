//! In-memory stand-ins for both control planes, used by orchestrator tests.
//! Instance statuses are scripted per list call so tests can walk an
//! instance through BOOTING -> RUNNING without a real provider.

use crate::{BackendRegistry, ComputeProvider};
use async_trait::async_trait;
use pictor_common::{
    BackendRegistration, ComputeImage, ComputeInstance, CreateInstanceRequest, Error,
    InstanceStatus, RawTaskStatus, ResourceOffer, Result,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct ScriptedInstance {
    app_id: String,
    app_image_id: String,
    // One code per list call; the last one sticks.
    statuses: VecDeque<i64>,
}

impl ScriptedInstance {
    fn next_code(&mut self) -> i64 {
        if self.statuses.len() > 1 {
            self.statuses.pop_front().unwrap()
        } else {
            *self.statuses.front().unwrap_or(&300)
        }
    }
}

#[derive(Default)]
pub struct MockComputeProvider {
    images: Mutex<Vec<ComputeImage>>,
    offers: Mutex<Vec<ResourceOffer>>,
    instances: Mutex<Vec<ScriptedInstance>>,
    balance: Mutex<f64>,
    last_create: Mutex<Option<CreateInstanceRequest>>,
    pub list_instance_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockComputeProvider {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.balance.lock().unwrap() = 100.0;
        mock
    }

    pub fn set_balance(&self, balance: f64) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn add_image(&self, app_image_id: &str) {
        self.images.lock().unwrap().push(ComputeImage {
            app_image_id: app_image_id.to_string(),
        });
    }

    pub fn add_offer(&self, gpu_type: &str, region_id: &str, max_gpu_num: i64) {
        self.offers.lock().unwrap().push(ResourceOffer {
            gpu_type: gpu_type.to_string(),
            region_id: region_id.to_string(),
            max_gpu_num,
        });
    }

    /// Seed an instance whose status walks through `statuses`, one code per
    /// list call, then stays at the last one.
    pub fn add_instance(&self, app_id: &str, app_image_id: &str, statuses: &[i64]) {
        self.instances.lock().unwrap().push(ScriptedInstance {
            app_id: app_id.to_string(),
            app_image_id: app_image_id.to_string(),
            statuses: statuses.iter().copied().collect(),
        });
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.app_id.clone())
            .collect()
    }

    pub fn last_create_request(&self) -> Option<CreateInstanceRequest> {
        self.last_create.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeProvider for MockComputeProvider {
    async fn list_images(&self) -> Result<Vec<ComputeImage>> {
        Ok(self.images.lock().unwrap().clone())
    }

    async fn list_offers(&self, _app_image_id: &str) -> Result<Vec<ResourceOffer>> {
        Ok(self.offers.lock().unwrap().clone())
    }

    async fn list_instances(&self) -> Result<Vec<ComputeInstance>> {
        self.list_instance_calls.fetch_add(1, Ordering::SeqCst);
        let mut instances = self.instances.lock().unwrap();
        Ok(instances
            .iter_mut()
            .map(|inst| ComputeInstance {
                app_id: inst.app_id.clone(),
                app_image_id: inst.app_image_id.clone(),
                status: InstanceStatus::from_code(inst.next_code()),
                gpu_type: None,
                region_id: None,
            })
            .collect())
    }

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_create.lock().unwrap() = Some(req.clone());
        let app_id = format!("mock-app-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.instances.lock().unwrap().push(ScriptedInstance {
            app_id: app_id.clone(),
            app_image_id: req.app_image_id.clone(),
            statuses: [100, 300].into_iter().collect(),
        });
        Ok(app_id)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let mut instances = self.instances.lock().unwrap();
        let inst = instances
            .iter_mut()
            .find(|i| i.app_id == instance_id)
            .ok_or_else(|| Error::NotFound(format!("instance {}", instance_id)))?;
        inst.statuses = [100, 300].into_iter().collect();
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut instances = self.instances.lock().unwrap();
        let inst = instances
            .iter_mut()
            .find(|i| i.app_id == instance_id)
            .ok_or_else(|| Error::NotFound(format!("instance {}", instance_id)))?;
        inst.statuses = [400, 800].into_iter().collect();
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut instances = self.instances.lock().unwrap();
        let before = instances.len();
        instances.retain(|i| i.app_id != instance_id);
        if instances.len() == before {
            return Err(Error::NotFound(format!("instance {}", instance_id)));
        }
        Ok(())
    }

    async fn wallet_balance(&self) -> Result<f64> {
        Ok(*self.balance.lock().unwrap())
    }
}

#[derive(Default)]
pub struct MockBackendRegistry {
    backends: Mutex<Vec<BackendRegistration>>,
    registered_on: Mutex<Vec<(String, String)>>,
    submitted: Mutex<Vec<serde_json::Value>>,
    tasks: Mutex<HashMap<String, RawTaskStatus>>,
    pub register_calls: AtomicUsize,
    pub deregister_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_backend(&self, name: &str, is_live: bool, is_down: bool, status: &str) {
        self.backends.lock().unwrap().push(BackendRegistration {
            name: name.to_string(),
            is_live,
            is_down,
            status: status.to_string(),
        });
    }

    pub fn set_task_state(&self, task_id: &str, raw: RawTaskStatus) {
        self.tasks.lock().unwrap().insert(task_id.to_string(), raw);
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.name.clone())
            .collect()
    }

    /// (backend name, instance id) pairs in registration order.
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.registered_on.lock().unwrap().clone()
    }

    pub fn submitted_workflows(&self) -> Vec<serde_json::Value> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendRegistry for MockBackendRegistry {
    async fn list_backends(&self) -> Result<Vec<BackendRegistration>> {
        Ok(self.backends.lock().unwrap().clone())
    }

    async fn register_backend(&self, instance_id: &str) -> Result<String> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let name = format!("backend-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.backends.lock().unwrap().push(BackendRegistration {
            name: name.clone(),
            is_live: true,
            is_down: false,
            status: "running".to_string(),
        });
        self.registered_on
            .lock()
            .unwrap()
            .push((name.clone(), instance_id.to_string()));
        Ok(name)
    }

    async fn deregister_backend(&self, name: &str) -> Result<()> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        // Mirrors the HTTP client: deleting a missing name is a success.
        self.backends.lock().unwrap().retain(|b| b.name != name);
        Ok(())
    }

    async fn submit_workflow(&self, workflow: &serde_json::Value) -> Result<String> {
        self.submitted.lock().unwrap().push(workflow.clone());
        Ok(format!(
            "task-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ))
    }

    async fn task_state(&self, task_id: &str) -> Result<RawTaskStatus> {
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))
    }
}

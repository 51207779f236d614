use async_trait::async_trait;
use pictor_common::{
    BackendRegistration, ComputeImage, ComputeInstance, CreateInstanceRequest, RawTaskStatus,
    ResourceOffer, Result,
};

/// Control plane of the GPU compute provider.
///
/// Every call is one authenticated request. Mutating calls (create, start,
/// stop, delete) are never retried by implementations: a silent retry of
/// create could double-provision, so retrying them is the orchestration
/// layer's decision.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn list_images(&self) -> Result<Vec<ComputeImage>>;
    async fn list_offers(&self, app_image_id: &str) -> Result<Vec<ResourceOffer>>;
    async fn list_instances(&self) -> Result<Vec<ComputeInstance>>;

    /// Returns the new instance id.
    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<String>;
    async fn start_instance(&self, instance_id: &str) -> Result<()>;
    async fn stop_instance(&self, instance_id: &str) -> Result<()>;
    async fn delete_instance(&self, instance_id: &str) -> Result<()>;

    async fn wallet_balance(&self) -> Result<f64>;
}

/// Control plane of the rendering-backend pool: registrations bound to
/// compute instances, plus workflow submission and status reads.
#[async_trait]
pub trait BackendRegistry: Send + Sync {
    async fn list_backends(&self) -> Result<Vec<BackendRegistration>>;

    /// Returns the name of the new registration.
    async fn register_backend(&self, instance_id: &str) -> Result<String>;

    /// Deregistering a name the registry no longer knows is a success.
    async fn deregister_backend(&self, name: &str) -> Result<()>;

    /// The payload is opaque; returns the task id.
    async fn submit_workflow(&self, workflow: &serde_json::Value) -> Result<String>;

    /// Single status fetch, no interpretation beyond decoding.
    async fn task_state(&self, task_id: &str) -> Result<RawTaskStatus>;
}

pub mod compute;
pub mod registry;

#[cfg(feature = "mock")]
pub mod mock;

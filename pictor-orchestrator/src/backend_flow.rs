use crate::instance_flow::InstanceOrchestrator;
use pictor_common::Result;
use pictor_providers::BackendRegistry;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pairs exactly one compute instance with one backend registration. The
/// pool is shared: every caller converges on the same registration rather
/// than getting one of its own.
pub struct BackendOrchestrator {
    registry: Arc<dyn BackendRegistry>,
    instances: Arc<InstanceOrchestrator>,
    app_image_id: String,
    // The provider exposes no compare-and-swap, so two concurrent
    // list-then-register sequences can both observe "none" and both
    // register. Same-process callers are serialized here; cross-process
    // races remain a provider-side reality.
    lock: Mutex<()>,
}

impl BackendOrchestrator {
    pub fn new(
        registry: Arc<dyn BackendRegistry>,
        instances: Arc<InstanceOrchestrator>,
        app_image_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            instances,
            app_image_id: app_image_id.into(),
            lock: Mutex::new(()),
        }
    }

    /// Converge on one usable registration and return its name. A stale
    /// registration is deregistered and replaced wholesale; the returned
    /// name never equals a stale one. Safe to call repeatedly.
    pub async fn ensure_backend(&self) -> Result<String> {
        let _guard = self.lock.lock().await;

        let backends = self.registry.list_backends().await?;
        if let Some(backend) = backends.first() {
            if backend.is_usable() {
                eprintln!("ℹ️ [backend-flow] Reusing backend {}", backend.name);
                return Ok(backend.name.clone());
            }
            eprintln!(
                "⚠️ [backend-flow] Backend {} unhealthy (is_live={}, is_down={}, status={}), replacing",
                backend.name, backend.is_live, backend.is_down, backend.status
            );
            self.registry.deregister_backend(&backend.name).await?;
        }

        let instance_id = self.instances.acquire_instance(&self.app_image_id).await?;
        let name = self.registry.register_backend(&instance_id).await?;
        eprintln!(
            "✅ [backend-flow] Registered backend {} on instance {}",
            name, instance_id
        );
        Ok(name)
    }
}

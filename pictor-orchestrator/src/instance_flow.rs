use crate::alerts::AlertSink;
use crate::state_machine::{wait_until, WaitPlan};
use pictor_common::{
    ComputeInstance, CreateInstanceRequest, Error, InstanceStatus, Result,
};
use pictor_providers::ComputeProvider;
use std::sync::Arc;
use std::time::Duration;

// Fixed billing shape for fresh instances: hourly billing, one GPU.
const BILL_TYPE: i32 = 3;
const BILL_DURATION: i32 = 1;
const GPU_NUM: i32 = 1;

pub const DEFAULT_GPU_ALLOW_LIST: [&str; 2] =
    ["NVIDIA-GEFORCE-RTX-4090", "NVIDIA-GEFORCE-RTX-3090"];

#[derive(Debug, Clone)]
pub struct InstanceOptions {
    pub gpu_allow_list: Vec<String>,
    pub low_balance_threshold: f64,
    pub poll_interval: Duration,
    pub acquire_deadline: Duration,
    pub release_deadline: Duration,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            gpu_allow_list: DEFAULT_GPU_ALLOW_LIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            low_balance_threshold: 20.0,
            poll_interval: Duration::from_secs(3),
            acquire_deadline: Duration::from_secs(600),
            release_deadline: Duration::from_secs(300),
        }
    }
}

/// Owns instance *selection*: which remote instance serves an image, and
/// when a fresh one is provisioned or an old one released. The provider owns
/// the actual transitions; we only observe them by re-listing.
pub struct InstanceOrchestrator {
    compute: Arc<dyn ComputeProvider>,
    alerts: Arc<dyn AlertSink>,
    opts: InstanceOptions,
}

impl InstanceOrchestrator {
    pub fn new(
        compute: Arc<dyn ComputeProvider>,
        alerts: Arc<dyn AlertSink>,
        opts: InstanceOptions,
    ) -> Self {
        Self {
            compute,
            alerts,
            opts,
        }
    }

    /// Image to drive when none is configured: the first entry of the
    /// private image list.
    pub async fn resolve_default_image(&self) -> Result<String> {
        let images = self.compute.list_images().await?;
        images
            .first()
            .map(|img| img.app_image_id.clone())
            .ok_or_else(|| Error::NotFound("private image list is empty".to_string()))
    }

    /// Find or provision a RUNNING instance of `app_image_id` and return its
    /// id. Reuse wins over provisioning: a running or booting instance is
    /// always taken first. A stopped instance is never restarted; its slot
    /// is released and a fresh instance provisioned in its place.
    pub async fn acquire_instance(&self, app_image_id: &str) -> Result<String> {
        self.check_balance().await;

        let images = self.compute.list_images().await?;
        if !images.iter().any(|img| img.app_image_id == app_image_id) {
            return Err(Error::NotFound(format!(
                "image {} is not in the private image list",
                app_image_id
            )));
        }

        let instances: Vec<ComputeInstance> = self
            .compute
            .list_instances()
            .await?
            .into_iter()
            .filter(|inst| inst.app_image_id == app_image_id)
            .collect();

        if let Some(inst) = instances.iter().find(|i| i.status.is_active()) {
            eprintln!(
                "ℹ️ [instance-flow] Reusing instance {} (status {:?})",
                inst.app_id, inst.status
            );
            if inst.status == InstanceStatus::Running {
                return Ok(inst.app_id.clone());
            }
            return self
                .wait_for_running(&inst.app_id, self.opts.acquire_deadline)
                .await;
        }

        if let Some(inst) = instances.iter().find(|i| i.status.is_winding_down()) {
            if inst.status == InstanceStatus::Stopping {
                eprintln!(
                    "🔵 [instance-flow] Instance {} is stopping, waiting it out",
                    inst.app_id
                );
                self.wait_for_stopped(&inst.app_id, self.opts.acquire_deadline)
                    .await?;
            }
            eprintln!(
                "🔵 [instance-flow] Releasing stopped instance {} before provisioning",
                inst.app_id
            );
            self.delete_if_present(&inst.app_id).await?;
        }

        let offers = self.compute.list_offers(app_image_id).await?;
        let offer = offers
            .iter()
            .find(|o| {
                o.max_gpu_num > 0 && self.opts.gpu_allow_list.iter().any(|t| t == &o.gpu_type)
            })
            .ok_or(Error::NoCapacity)?;

        eprintln!(
            "🔵 [instance-flow] Provisioning: image={}, gpu={}, region={}",
            app_image_id, offer.gpu_type, offer.region_id
        );
        let req = CreateInstanceRequest {
            app_image_id: app_image_id.to_string(),
            gpu_type: offer.gpu_type.clone(),
            region_id: offer.region_id.clone(),
            bill_type: BILL_TYPE,
            duration: BILL_DURATION,
            gpu_num: GPU_NUM,
        };
        let app_id = self.compute.create_instance(&req).await?;
        let app_id = self
            .wait_for_running(&app_id, self.opts.acquire_deadline)
            .await?;
        eprintln!("✅ [instance-flow] Instance {} is running", app_id);
        self.alerts
            .notify(&format!("Provisioned a fresh render instance {}", app_id))
            .await;
        Ok(app_id)
    }

    /// Stop and release `app_id`. Releasing an id the provider does not know
    /// is a success with no side effects; deletion is idempotent.
    pub async fn release_instance(&self, app_id: &str) -> Result<()> {
        let Some(inst) = self.find_instance(app_id).await? else {
            eprintln!(
                "ℹ️ [instance-flow] Instance {} already gone, nothing to release",
                app_id
            );
            return Ok(());
        };

        match inst.status {
            InstanceStatus::Stopped => self.delete_if_present(app_id).await,
            InstanceStatus::Running => self.stop_then_delete(app_id).await,
            InstanceStatus::Stopping => {
                self.wait_for_stopped(app_id, self.opts.release_deadline)
                    .await?;
                self.delete_if_present(app_id).await
            }
            // Booting or an unrecognized code: wait until the provider
            // settles on RUNNING or STOPPED, then take the matching branch.
            InstanceStatus::Booting | InstanceStatus::Other(_) => {
                match self
                    .wait_for_settled(app_id, self.opts.release_deadline)
                    .await?
                {
                    Some(InstanceStatus::Running) => self.stop_then_delete(app_id).await,
                    Some(_) => self.delete_if_present(app_id).await,
                    // Vanished while we waited: already released remotely.
                    None => Ok(()),
                }
            }
        }
    }

    async fn stop_then_delete(&self, app_id: &str) -> Result<()> {
        eprintln!("🔵 [instance-flow] Stopping instance {}", app_id);
        self.compute.stop_instance(app_id).await?;
        self.wait_for_stopped(app_id, self.opts.release_deadline)
            .await?;
        self.delete_if_present(app_id).await
    }

    async fn delete_if_present(&self, app_id: &str) -> Result<()> {
        match self.compute.delete_instance(app_id).await {
            Ok(()) => {
                eprintln!("✅ [instance-flow] Instance {} released", app_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Low-balance warning, best effort. The wallet read exists only to feed
    /// the alert, so a failed read is logged and skipped, never fatal.
    async fn check_balance(&self) {
        match self.compute.wallet_balance().await {
            Ok(balance) => {
                if balance < self.opts.low_balance_threshold {
                    eprintln!(
                        "⚠️ [instance-flow] Balance {:.2} below threshold {:.2}",
                        balance, self.opts.low_balance_threshold
                    );
                    self.alerts
                        .notify(&format!(
                            "Provider balance is down to {:.2}, top up soon.",
                            balance
                        ))
                        .await;
                }
            }
            Err(e) => eprintln!("⚠️ [instance-flow] Wallet check failed (continuing): {}", e),
        }
    }

    async fn find_instance(&self, app_id: &str) -> Result<Option<ComputeInstance>> {
        Ok(self
            .compute
            .list_instances()
            .await?
            .into_iter()
            .find(|inst| inst.app_id == app_id))
    }

    /// Poll the instance list until `app_id` reports RUNNING. An instance
    /// that disappears mid-boot is a hard error: someone else released it.
    async fn wait_for_running(&self, app_id: &str, deadline: Duration) -> Result<String> {
        let plan = WaitPlan::new(self.opts.poll_interval, deadline);
        let outcome = wait_until(plan, || async move {
            match self.find_instance(app_id).await? {
                None => Err(Error::NotFound(format!(
                    "instance {} disappeared while booting",
                    app_id
                ))),
                Some(inst) if inst.status == InstanceStatus::Running => Ok(Some(inst.app_id)),
                Some(inst) => {
                    eprintln!(
                        "🔍 [instance-flow] Instance {} still {:?}",
                        app_id, inst.status
                    );
                    Ok(None)
                }
            }
        })
        .await?;
        outcome.into_result(&format!("instance {} to reach RUNNING", app_id))
    }

    /// Poll until `app_id` reports STOPPED. An instance that disappears from
    /// the list counts as stopped: the release already happened remotely.
    async fn wait_for_stopped(&self, app_id: &str, deadline: Duration) -> Result<()> {
        let plan = WaitPlan::new(self.opts.poll_interval, deadline);
        let outcome = wait_until(plan, || async move {
            match self.find_instance(app_id).await? {
                None => Ok(Some(())),
                Some(inst) if inst.status == InstanceStatus::Stopped => Ok(Some(())),
                Some(_) => Ok(None),
            }
        })
        .await?;
        outcome.into_result(&format!("instance {} to reach STOPPED", app_id))
    }

    /// Poll until the instance settles on RUNNING or STOPPED. Returns None
    /// when it disappears instead.
    async fn wait_for_settled(
        &self,
        app_id: &str,
        deadline: Duration,
    ) -> Result<Option<InstanceStatus>> {
        let plan = WaitPlan::new(self.opts.poll_interval, deadline);
        let outcome = wait_until(plan, || async move {
            match self.find_instance(app_id).await? {
                None => Ok(Some(None)),
                Some(inst)
                    if matches!(
                        inst.status,
                        InstanceStatus::Running | InstanceStatus::Stopped
                    ) =>
                {
                    Ok(Some(Some(inst.status)))
                }
                Some(_) => Ok(None),
            }
        })
        .await?;
        outcome.into_result(&format!("instance {} to settle", app_id))
    }
}

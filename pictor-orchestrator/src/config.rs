use anyhow::Context;
use pictor_providers::compute::ComputeApiConfig;
use pictor_providers::registry::BackendApiConfig;
use std::env;

/// Runtime settings, read from the environment once at startup. Everything
/// downstream receives explicit values; nothing else touches the
/// environment after this.
#[derive(Debug, Clone)]
pub struct Settings {
    pub compute: ComputeApiConfig,
    pub backend: BackendApiConfig,
    pub alert_webhook_url: Option<String>,
    /// Empty means "drive the first image in the private image list".
    pub app_image_id: Option<String>,
    pub gpu_allow_list: Option<Vec<String>>,
    pub workflow_template_path: String,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let compute = ComputeApiConfig::new(
            required("COMPUTE_API_BASE_URL")?,
            required("COMPUTE_API_KEY")?,
        );
        let backend = BackendApiConfig::new(
            required("BACKEND_API_BASE_URL")?,
            required("BACKEND_API_KEY")?,
        );
        let gpu_allow_list = optional("GPU_ALLOW_LIST").map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });
        Ok(Self {
            compute,
            backend,
            alert_webhook_url: optional("ALERT_WEBHOOK_URL"),
            app_image_id: optional("APP_IMAGE_ID"),
            gpu_allow_list,
            workflow_template_path: optional("WORKFLOW_TEMPLATE_PATH")
                .unwrap_or_else(|| "workflows/base.json".to_string()),
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    value.with_context(|| format!("{} must be set", name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

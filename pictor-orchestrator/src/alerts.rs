use async_trait::async_trait;
use std::time::Duration;

/// Best-effort outbound notification. Implementations swallow their own
/// failures: an alert that cannot be delivered must never abort the
/// orchestration that raised it.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Posts plain-text messages to a chat webhook. Delivery is advisory: the
/// response status is logged and never checked.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl WebhookAlertSink {
    /// A sink built without a URL is a no-op.
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        Self {
            client,
            webhook_url: webhook_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn notify(&self, text: &str) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let payload = serde_json::json!({
            "msgtype": "text",
            "text": { "content": text }
        });
        match self.client.post(url).json(&payload).send().await {
            Ok(resp) => eprintln!("📝 [alerts] Webhook delivery status: {}", resp.status()),
            Err(e) => eprintln!("⚠️ [alerts] Webhook delivery failed (ignored): {}", e),
        }
    }
}

use crate::BackendRegistry;
use async_trait::async_trait;
use pictor_common::{BackendRegistration, Error, RawTaskStatus, Result, TaskState};
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackendApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl BackendApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Client for the rendering-backend control plane. No transparent retry
/// here: registration and workflow submission are not idempotent.
pub struct HttpBackendRegistry {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBackendRegistry {
    pub fn new(config: BackendApiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
        }
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_key);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        decode_response(&method, &url, resp).await
    }
}

async fn decode_response(method: &Method, url: &str, resp: Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let code = status.as_u16();
        let text = resp.text().await.unwrap_or_default();
        eprintln!(
            "❌ [backend-api] {} {} failed: status={}, response={}",
            method, url, code, text
        );
        return Err(match code {
            401 | 403 => Error::Auth(format!("status={} body={}", code, text)),
            404 => Error::NotFound(format!("{} {}", method, url)),
            _ => Error::Protocol(format!("status={} body={}", code, text)),
        });
    }
    resp.json::<Value>()
        .await
        .map_err(|e| Error::Protocol(format!("undecodable body from {} {}: {}", method, url, e)))
}

#[async_trait]
impl BackendRegistry for HttpBackendRegistry {
    async fn list_backends(&self) -> Result<Vec<BackendRegistration>> {
        let v = self.request(Method::GET, "/v1/backends", None).await?;
        // An empty pool comes back with no data field at all.
        let Some(list) = v["data"].as_array() else {
            return Ok(vec![]);
        };
        let mut backends = Vec::with_capacity(list.len());
        for b in list {
            backends.push(BackendRegistration {
                name: b["name"]
                    .as_str()
                    .ok_or_else(|| Error::Protocol("backend entry without name".into()))?
                    .to_string(),
                is_live: b["is_live"].as_bool().unwrap_or(false),
                is_down: b["is_down"].as_bool().unwrap_or(true),
                status: b["status"].as_str().unwrap_or("").to_string(),
            });
        }
        Ok(backends)
    }

    async fn register_backend(&self, instance_id: &str) -> Result<String> {
        eprintln!(
            "🔵 [backend-api] POST /v1/backends - registering instance {}",
            instance_id
        );
        let body = json!({ "instance_id": instance_id });
        let v = self.request(Method::POST, "/v1/backends", Some(&body)).await?;
        // The registry has answered with both shapes: `data.name` and
        // `data[0].name`.
        let name = v["data"]["name"]
            .as_str()
            .or_else(|| v["data"][0]["name"].as_str())
            .ok_or_else(|| Error::Protocol("register reply without backend name".into()))?
            .to_string();
        eprintln!("✅ [backend-api] Backend registered: {}", name);
        Ok(name)
    }

    async fn deregister_backend(&self, name: &str) -> Result<()> {
        let path = format!("/v1/backends/{}", name);
        match self.request(Method::DELETE, &path, None).await {
            Ok(_) => Ok(()),
            // Already gone is the state we wanted.
            Err(e) if e.is_not_found() => {
                eprintln!("ℹ️ [backend-api] Backend {} already deregistered", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_workflow(&self, workflow: &Value) -> Result<String> {
        let v = self
            .request(Method::POST, "/v1/prompts_workflow", Some(workflow))
            .await?;
        v["data"]["taskId"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Protocol("submit reply without taskId".into()))
    }

    async fn task_state(&self, task_id: &str) -> Result<RawTaskStatus> {
        let path = format!("/v1/prompts/{}/status", task_id);
        let v = self.request(Method::GET, &path, None).await?;
        let code = v["code"]
            .as_i64()
            .ok_or_else(|| Error::Protocol("task status reply without code".into()))?;
        let state = v["data"].as_object().map(|data| TaskState {
            status: data
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .to_string(),
            message: data
                .get("message")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .to_string(),
            images: data
                .get("images")
                .and_then(|i| i.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|u| u.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default(),
        });
        Ok(RawTaskStatus {
            code,
            msg: v["msg"].as_str().map(|s| s.to_string()),
            state,
        })
    }
}

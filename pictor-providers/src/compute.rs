use crate::ComputeProvider;
use async_trait::async_trait;
use pictor_common::{
    ComputeImage, ComputeInstance, CreateInstanceRequest, Error, InstanceStatus, ResourceOffer,
    Result,
};
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];
const MAX_READ_ATTEMPTS: u32 = 3;
const BACKOFF_START: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ComputeApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl ComputeApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(15),
        }
    }
}

pub struct HttpComputeProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpComputeProvider {
    pub fn new(config: ComputeApiConfig) -> Self {
        // Default reqwest client has no overall timeout. If the control plane
        // stalls, a poll loop upstream can hang forever.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .unwrap();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.api_key)).unwrap(),
        );
        headers
    }

    /// One authenticated request against the control plane.
    ///
    /// GET calls retry transient failures (429/500/502/503/504, connect and
    /// timeout errors): 3 attempts total, backoff starting at 500ms and
    /// doubling. Mutating calls go out exactly once.
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let idempotent = method == Method::GET;
        let mut attempt = 0u32;
        let mut backoff = BACKOFF_START;

        loop {
            attempt += 1;
            let mut req = self
                .client
                .request(method.clone(), &url)
                .headers(self.headers());
            if let Some(b) = body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if idempotent
                        && attempt < MAX_READ_ATTEMPTS
                        && RETRYABLE_STATUS.contains(&status)
                    {
                        eprintln!(
                            "⚠️ [compute-api] {} {} returned {}, retrying in {:?} (attempt {}/{})",
                            method, url, status, backoff, attempt, MAX_READ_ATTEMPTS
                        );
                        sleep(backoff).await;
                        backoff *= 2;
                        continue;
                    }
                    return decode_response(&method, &url, resp).await;
                }
                Err(e) => {
                    if idempotent && attempt < MAX_READ_ATTEMPTS && (e.is_timeout() || e.is_connect())
                    {
                        eprintln!(
                            "⚠️ [compute-api] {} {} transport error ({}), retrying in {:?} (attempt {}/{})",
                            method, url, e, backoff, attempt, MAX_READ_ATTEMPTS
                        );
                        sleep(backoff).await;
                        backoff *= 2;
                        continue;
                    }
                    eprintln!("❌ [compute-api] {} {} failed: {}", method, url, e);
                    return Err(Error::Transport(e.to_string()));
                }
            }
        }
    }
}

async fn decode_response(method: &Method, url: &str, resp: Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let code = status.as_u16();
        let text = resp.text().await.unwrap_or_default();
        eprintln!(
            "❌ [compute-api] {} {} failed: status={}, response={}",
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

fn require_str(v: &Value, field: &str, context: &str) -> Result<String> {
    v[field]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Protocol(format!("missing '{}' in {}", field, context)))
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn list_images(&self) -> Result<Vec<ComputeImage>> {
        let v = self
            .request(Method::GET, "/api/v2/app/private/image/list", None)
            .await?;
        let list = v["data"]["privateImageList"]
            .as_array()
            .ok_or_else(|| Error::Protocol("no privateImageList in image list reply".into()))?;
        let mut images = Vec::with_capacity(list.len());
        for img in list {
            images.push(ComputeImage {
                app_image_id: require_str(img, "appImageId", "image list entry")?,
            });
        }
        Ok(images)
    }

    async fn list_offers(&self, app_image_id: &str) -> Result<Vec<ResourceOffer>> {
        let path = format!("/api/v2/resources/?appImageId={}", app_image_id);
        let v = self.request(Method::GET, &path, None).await?;
        let list = v["data"]["resourceList"]
            .as_array()
            .ok_or_else(|| Error::Protocol("no resourceList in resources reply".into()))?;
        let mut offers = Vec::with_capacity(list.len());
        for r in list {
            offers.push(ResourceOffer {
                gpu_type: require_str(r, "gpuType", "resource entry")?,
                region_id: require_str(r, "regionId", "resource entry")?,
                max_gpu_num: r["maxGpuNum"].as_i64().unwrap_or(0),
            });
        }
        Ok(offers)
    }

    async fn list_instances(&self) -> Result<Vec<ComputeInstance>> {
        let v = self.request(Method::GET, "/api/v2/app", None).await?;
        let list = v["data"]["appList"]
            .as_array()
            .ok_or_else(|| Error::Protocol("no appList in instance list reply".into()))?;
        let mut instances = Vec::with_capacity(list.len());
        for inst in list {
            let code = inst["status"]
                .as_i64()
                .ok_or_else(|| Error::Protocol("non-numeric instance status".into()))?;
            instances.push(ComputeInstance {
                app_id: require_str(inst, "appId", "instance entry")?,
                app_image_id: require_str(inst, "appImageId", "instance entry")?,
                status: InstanceStatus::from_code(code),
                gpu_type: inst["gpuType"].as_str().map(|s| s.to_string()),
                region_id: inst["regionId"].as_str().map(|s| s.to_string()),
            });
        }
        Ok(instances)
    }

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<String> {
        eprintln!(
            "🔵 [compute-api] POST /api/v2/app - creating instance: image={}, gpu={}, region={}",
            req.app_image_id, req.gpu_type, req.region_id
        );
        let body = json!({
            "appImageId": req.app_image_id,
            "gpuType": req.gpu_type,
            "regionId": req.region_id,
            "billType": req.bill_type,
            "duration": req.duration,
            "gpuNum": req.gpu_num,
        });
        let v = self
            .request(Method::POST, "/api/v2/app", Some(&body))
            .await?;
        let app_id = require_str(&v["data"], "appId", "create reply")?;
        eprintln!("✅ [compute-api] Instance created: {}", app_id);
        Ok(app_id)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        let path = format!("/api/v1/app/operate/boot/{}", instance_id);
        self.request(Method::PUT, &path, None).await?;
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        let path = format!("/api/v1/app/operate/shutdown/{}", instance_id);
        self.request(Method::PUT, &path, None).await?;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let path = format!("/api/v1/app/{}", instance_id);
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn wallet_balance(&self) -> Result<f64> {
        let v = self
            .request(Method::GET, "/api/v1/account/wallet/detail", None)
            .await?;
        // The wallet endpoint has been seen returning the balance both as a
        // number and as a decimal string.
        let balance = &v["data"]["availableBalance"];
        balance
            .as_f64()
            .or_else(|| balance.as_str().and_then(|s| s.parse::<f64>().ok()))
            .ok_or_else(|| Error::Protocol("missing 'availableBalance' in wallet reply".into()))
    }
}

use std::time::Duration;

use async_trait::async_trait;
use common::config::AssemblyConfig;
use common::TransformConfig;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::error::ProcessError;
use crate::kind::MediaKind;
use crate::processor::{TransformOutputs, TransformRequest, VariantProcessor};

/// Assembly-pipeline backend: each dispatch becomes a multi-step pipeline
/// (import, transform, store) submitted to an assembly service. Unlike the
/// direct backend this one has its own completion signal, a status URL the
/// response carries, and polls it when the caller waits.
pub struct AssemblyProcessor {
    client: reqwest::Client,
    assembly: AssemblyConfig,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
struct AssemblyResponse {
    #[serde(default)]
    assembly_id: Option<String>,
    status: String,
    #[serde(default)]
    status_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AssemblyProcessor {
    pub fn new(config: &TransformConfig) -> Result<Self, ProcessError> {
        let assembly = config.assembly.clone().ok_or_else(|| {
            ProcessError::Internal("assembly dispatch requires [transform.assembly] config".into())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            assembly,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
        })
    }

    fn import_step(&self, key: &str) -> Value {
        json!({
            "robot": "import",
            "bucket": self.assembly.bucket,
            "region": self.assembly.region,
            "access_key": self.assembly.access_key,
            "secret_key": self.assembly.secret_key,
            "path": key,
        })
    }

    fn store_step(&self, name: &str, key: &str, use_step: &str) -> Value {
        json!({
            "robot": "store",
            "name": name,
            "use": use_step,
            "bucket": self.assembly.bucket,
            "region": self.assembly.region,
            "access_key": self.assembly.access_key,
            "secret_key": self.assembly.secret_key,
            "path": key,
        })
    }

    fn resize_step(name: &str, use_step: &str, request: &TransformRequest) -> Value {
        let mut step = json!({
            "robot": match request.kind {
                MediaKind::Image => "image/resize",
                MediaKind::Video => "video/resize",
            },
            "name": name,
            "use": use_step,
            "width": request.dimensions.0,
            "height": request.dimensions.1,
            "rotation": request.rotation,
            "format": request.format,
        });
        if let Some(quality) = request.quality {
            step["quality"] = json!(quality);
        }
        step
    }

    /// The pipeline for one request. Variant requests are import, resize,
    /// store. Preview requests insert a thumbnail extraction between the
    /// import and the resize, and store both the frame and the resized
    /// variant.
    fn steps(&self, request: &TransformRequest) -> Vec<Value> {
        match &request.outputs {
            TransformOutputs::Variant(target) => vec![
                self.import_step(&request.source.key),
                Self::resize_step("resized", "import", request),
                self.store_step("store_variant", &target.key, "resized"),
            ],
            TransformOutputs::Preview { image, variant } => vec![
                self.import_step(&request.source.key),
                json!({
                    "robot": "video/thumbnail",
                    "name": "frame",
                    "use": "import",
                }),
                Self::resize_step("resized", "frame", request),
                self.store_step("store_frame", &image.key, "frame"),
                self.store_step("store_variant", &variant.key, "resized"),
            ],
        }
    }

    async fn submit(&self, request: &TransformRequest) -> Result<AssemblyResponse, ProcessError> {
        let url = format!("{}/assemblies", self.assembly.endpoint);
        let body = json!({
            "auth_key": self.assembly.auth_key,
            "steps": self.steps(request),
        });
        let response = match self.client.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() && request.tolerate_timeout => {
                warn!(url, "assembly submission timed out; treating as accepted");
                return Ok(AssemblyResponse {
                    assembly_id: None,
                    status: "accepted".to_string(),
                    status_url: None,
                    message: None,
                });
            }
            Err(err) if err.is_timeout() => return Err(ProcessError::DispatchTimedOut),
            Err(err) => return Err(err.into()),
        };

        let status = response.status();
        if status == StatusCode::GATEWAY_TIMEOUT {
            if request.tolerate_timeout {
                warn!(url, "assembly gateway timeout; treating as accepted");
                return Ok(AssemblyResponse {
                    assembly_id: None,
                    status: "accepted".to_string(),
                    status_url: None,
                    message: None,
                });
            }
            return Err(ProcessError::DispatchTimedOut);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessError::DispatchRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn poll_until_done(&self, status_url: &str) -> Result<(), ProcessError> {
        for _ in 0..self.max_polls {
            let state: AssemblyResponse =
                self.client.get(status_url).send().await?.json().await?;
            match state.status.as_str() {
                "completed" => return Ok(()),
                "error" | "canceled" => {
                    return Err(ProcessError::RemoteProcessingFailed(
                        state.message.unwrap_or_else(|| state.status.clone()),
                    ));
                }
                other => debug!(status = other, status_url, "assembly still running"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(ProcessError::DispatchTimedOut)
    }
}

#[async_trait]
impl VariantProcessor for AssemblyProcessor {
    #[instrument(skip_all, fields(path = request.dispatch_path()))]
    async fn dispatch(&self, request: &TransformRequest, wait: bool) -> Result<(), ProcessError> {
        let accepted = self.submit(request).await?;
        info!(
            assembly_id = accepted.assembly_id.as_deref().unwrap_or("unknown"),
            status = accepted.status,
            "assembly submitted"
        );

        match accepted.status.as_str() {
            "error" | "canceled" => {
                return Err(ProcessError::RemoteProcessingFailed(
                    accepted.message.unwrap_or(accepted.status),
                ));
            }
            _ => {}
        }

        if !wait {
            return Ok(());
        }
        match accepted.status_url {
            Some(status_url) => self.poll_until_done(&status_url).await,
            // A tolerated timeout leaves us without a status URL; nothing
            // left to wait on here.
            None => Ok(()),
        }
    }
}

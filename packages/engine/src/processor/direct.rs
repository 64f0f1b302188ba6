use std::time::Duration;

use async_trait::async_trait;
use common::TransformConfig;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::error::ProcessError;
use crate::processor::{TransformOutputs, TransformRequest, VariantProcessor};

/// Fire-and-forget HTTP backend: one POST per transformation to the
/// resolved endpoint. The service writes output bytes directly to the
/// target address; completion is observed by the caller via storage, not
/// via this backend.
pub struct DirectProcessor {
    client: reqwest::Client,
}

impl DirectProcessor {
    pub fn new(config: &TransformConfig) -> Result<Self, ProcessError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    fn payload(request: &TransformRequest) -> Value {
        let mut body = json!({
            "blob_url": request.source.url,
            "dimensions": request.dimensions_param(),
            "rotation": request.rotation,
            "format": request.format,
        });
        if let Some(quality) = request.quality {
            body["quality"] = json!(quality);
        }
        match &request.outputs {
            TransformOutputs::Variant(target) => {
                body["variant_url"] = json!(target.url);
            }
            TransformOutputs::Preview { image, variant } => {
                body["preview_image_url"] = json!(image.url);
                body["preview_image_variant_url"] = json!(variant.url);
            }
        }
        body
    }
}

#[async_trait]
impl VariantProcessor for DirectProcessor {
    #[instrument(skip_all, fields(path = request.dispatch_path()))]
    async fn dispatch(&self, request: &TransformRequest, _wait: bool) -> Result<(), ProcessError> {
        let url = format!("{}/{}", request.endpoint, request.dispatch_path());
        let response = match self.client.post(&url).json(&Self::payload(request)).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() && request.tolerate_timeout => {
                warn!(url, "request timed out; treating as accepted");
                return Ok(());
            }
            Err(err) if err.is_timeout() => return Err(ProcessError::DispatchTimedOut),
            Err(err) => return Err(err.into()),
        };

        match response.status() {
            StatusCode::CREATED => {
                info!(url, "transformation accepted");
                Ok(())
            }
            StatusCode::GATEWAY_TIMEOUT if request.tolerate_timeout => {
                warn!(url, "gateway timeout; treating as accepted");
                Ok(())
            }
            StatusCode::GATEWAY_TIMEOUT => Err(ProcessError::DispatchTimedOut),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProcessError::DispatchRejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

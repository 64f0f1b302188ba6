use std::sync::Arc;

use async_trait::async_trait;
use common::TransformConfig;
use common::storage::ObjectStore;
use tracing::debug;

use crate::entity::blob;
use crate::error::ProcessError;
use crate::repository::BlobRepository;

/// Owner record types that are themselves engine bookkeeping, not domain
/// owners. Attachments to these never carry an endpoint override.
const INTERNAL_RECORD_TYPES: [&str; 2] = ["variant_record", "blob"];

/// Looks up a per-owner transformation endpoint override.
///
/// The host application implements this against its own domain tables; the
/// engine only knows owners by (record_type, record_id).
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn endpoint_for(&self, record_type: &str, record_id: &str) -> Option<String>;
}

/// Chooses how blobs are addressed in dispatch payloads.
pub struct UrlResolver {
    store: Arc<dyn ObjectStore>,
    config: TransformConfig,
}

impl UrlResolver {
    pub fn new(store: Arc<dyn ObjectStore>, config: TransformConfig) -> Self {
        Self { store, config }
    }

    /// Address the remote service reads the source from.
    pub async fn read_url(&self, key: &str) -> Result<String, ProcessError> {
        if self.config.use_presigned_urls {
            Ok(self
                .store
                .presigned_get_url(key, self.config.presigned_url_expiration)
                .await?)
        } else {
            Ok(strip_query(self.store.public_url(key)?))
        }
    }

    /// Address the remote service writes the output to.
    pub async fn write_url(&self, key: &str) -> Result<String, ProcessError> {
        if self.config.use_presigned_urls {
            Ok(self
                .store
                .presigned_put_url(key, self.config.presigned_url_expiration)
                .await?)
        } else {
            Ok(strip_query(self.store.public_url(key)?))
        }
    }

    /// Endpoint for a dispatch touching `source`: the owning domain
    /// record's override when one is set and non-empty, the configured
    /// global endpoint otherwise.
    pub async fn resolve_endpoint(
        &self,
        repo: &BlobRepository,
        source: &blob::Model,
        endpoints: Option<&dyn EndpointResolver>,
    ) -> Result<String, ProcessError> {
        if let Some(resolver) = endpoints {
            let attachments = repo.attachments_for_blob(source.id).await?;
            let owner = attachments
                .iter()
                .find(|a| !INTERNAL_RECORD_TYPES.contains(&a.record_type.as_str()));
            if let Some(owner) = owner
                && let Some(endpoint) = resolver
                    .endpoint_for(&owner.record_type, &owner.record_id)
                    .await
                && !endpoint.is_empty()
            {
                debug!(
                    record_type = owner.record_type,
                    record_id = owner.record_id,
                    "using per-owner endpoint override"
                );
                return Ok(endpoint);
            }
        }
        Ok(self.config.endpoint.clone())
    }
}

/// In path mode the remote service expects bare object paths; drop any
/// query string a store may append.
fn strip_query(url: String) -> String {
    match url.split_once('?') {
        Some((path, _)) => path.to_string(),
        None => url,
    }
}

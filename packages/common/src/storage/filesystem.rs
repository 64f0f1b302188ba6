use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::error::StorageError;
use super::traits::ObjectStore;

/// Filesystem-backed object store for development and tests.
///
/// Objects live directly under `base_path` as `{base_path}/{key}`; keys are
/// flat tokens, so path separators are rejected. Presigned URLs carry
/// `X-Amz-Expires` and `X-Amz-Signature` query parameters in the shape the
/// dispatch payload checks expect. The signature is a plain digest over a
/// local secret; it gates nothing and exists so URL-shape assertions hold
/// outside of a real bucket.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
    base_url: String,
    signing_secret: String,
}

impl FilesystemObjectStore {
    pub async fn new(
        base_path: PathBuf,
        base_url: impl Into<String>,
        signing_secret: impl Into<String>,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        Ok(Self {
            base_path,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    fn sign(&self, key: &str, method: &str, expires_in: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(method.as_bytes());
        hasher.update(key.as_bytes());
        hasher.update(expires_in.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    fn presigned(&self, key: &str, method: &str, expires_in: u64) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(format!(
            "{}/{}?X-Amz-Expires={}&X-Amz-Signature={}",
            self.base_url,
            key,
            expires_in,
            self.sign(key, method, expires_in)
        ))
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        fs::write(&path, data).await?;
        debug!(key, bytes = data.len(), "wrote object");
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn presigned_get_url(&self, key: &str, expires_in: u64) -> Result<String, StorageError> {
        self.presigned(key, "GET", expires_in)
    }

    async fn presigned_put_url(&self, key: &str, expires_in: u64) -> Result<String, StorageError> {
        self.presigned(key, "PUT", expires_in)
    }

    async fn byte_size(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

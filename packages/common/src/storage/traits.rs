use async_trait::async_trait;

use super::error::StorageError;

/// Keyed object storage as seen by the dispatch engine.
///
/// The engine allocates keys before any bytes exist and hands them to a
/// remote processor, which writes the objects out of band. Readers must
/// therefore tolerate keys that resolve to nothing yet.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object under `key`, replacing any previous content.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str)
    -> Result<(), StorageError>;

    /// Stable URL for the object, with no query string semantics attached.
    fn public_url(&self, key: &str) -> Result<String, StorageError>;

    /// Time-limited URL granting read access to the object.
    async fn presigned_get_url(&self, key: &str, expires_in: u64) -> Result<String, StorageError>;

    /// Time-limited URL granting write access to the key.
    async fn presigned_put_url(&self, key: &str, expires_in: u64) -> Result<String, StorageError>;

    /// Size of the object in bytes, or `None` if nothing has been written
    /// under the key yet.
    async fn byte_size(&self, key: &str) -> Result<Option<u64>, StorageError>;

    /// Check whether an object exists under the key.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.byte_size(key).await?.is_some())
    }
}

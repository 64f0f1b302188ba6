use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

use super::error::StorageError;
use super::traits::ObjectStore;

/// S3-backed object store (`object-storage` feature).
///
/// Presigned URLs come straight from the bucket signer, so payload checks
/// for `X-Amz-` query parameters hold against real buckets as well.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
}

impl S3ObjectStore {
    pub fn new(
        bucket_name: &str,
        region: Region,
        credentials: Credentials,
    ) -> Result<Self, StorageError> {
        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String, StorageError> {
        Ok(format!("{}/{}", self.bucket.url(), key))
    }

    async fn presigned_get_url(&self, key: &str, expires_in: u64) -> Result<String, StorageError> {
        self.bucket
            .presign_get(key, expires_in as u32, None)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn presigned_put_url(&self, key: &str, expires_in: u64) -> Result<String, StorageError> {
        self.bucket
            .presign_put(key, expires_in as u32, None, None)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn byte_size(&self, key: &str) -> Result<Option<u64>, StorageError> {
        match self.bucket.head_object(key).await {
            Ok((head, _)) => Ok(head.content_length.map(|len| len.max(0) as u64)),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }
}

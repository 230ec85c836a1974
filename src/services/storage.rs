use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;

/// Failures surfaced by the object store. `Unavailable` means the store
/// could not be reached at all; the other variants are per-operation
/// failures reported by the store itself.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("object write failed: {0}")]
    WriteFailed(String),
    #[error("object delete failed: {0}")]
    DeleteFailed(String),
}

/// Opaque blob storage keyed by caller-chosen identifiers. All metadata is
/// duplicated into the relational records; the store is never queried for
/// it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn write(&self, key: &str, mime_type: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Deletes the object if present and reports whether one was deleted.
    /// A missing key is not an error.
    async fn delete_if_exists(&self, key: &str) -> Result<bool, StorageError>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn write(&self, key: &str, mime_type: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(mime_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| match e {
                SdkError::DispatchFailure(cause) => StorageError::Unavailable(format!("{cause:?}")),
                SdkError::TimeoutError(_) => {
                    StorageError::Unavailable("request timed out".to_string())
                }
                other => StorageError::WriteFailed(format!("{other:?}")),
            })?;
        Ok(())
    }

    async fn delete_if_exists(&self, key: &str) -> Result<bool, StorageError> {
        if let Err(e) = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            let service_error = e.into_service_error();
            if service_error.is_not_found() {
                return Ok(false);
            }
            return Err(StorageError::Unavailable(format!("{service_error:?}")));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(format!("{e:?}")))?;
        Ok(true)
    }
}

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("no object-store credentials configured")]
    NoCredentials,
    #[error("no stored credential for account {0}")]
    UnknownAccount(String),
    #[error("{0} credential records stored, request must name an account")]
    AmbiguousAccount(usize),
    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },
    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
    #[error("failed to open stored credential: {0}")]
    Credential(#[from] s3ferry_storage::CipherError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Bucket/key operations against an object store.
///
/// The transfer orchestrator only consumes `copy_object`; the remaining
/// capabilities serve the file-browsing API surface. `account` selects the
/// stored credential record; `None` is valid only while a single record
/// exists.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_objects(
        &self,
        account: Option<&str>,
        bucket: &str,
    ) -> Result<Vec<String>, ObjectStoreError>;

    async fn put_object(
        &self,
        account: Option<&str>,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), ObjectStoreError>;

    async fn get_object(
        &self,
        account: Option<&str>,
        bucket: &str,
        key: &str,
    ) -> Result<Bytes, ObjectStoreError>;

    async fn copy_object(
        &self,
        account: Option<&str>,
        source_bucket: &str,
        destination_bucket: &str,
        key: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn bucket_exists(
        &self,
        account: Option<&str>,
        bucket: &str,
    ) -> Result<bool, ObjectStoreError>;

    async fn create_bucket(
        &self,
        account: Option<&str>,
        bucket: &str,
    ) -> Result<(), ObjectStoreError>;
}

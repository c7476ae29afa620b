use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use s3ferry_storage::{CredentialRecord, FerryStorage, SecretCipher};
use tracing::info;

use crate::store::{ObjectStore, ObjectStoreError};

#[derive(Debug, Clone, Default)]
pub struct AwsStoreConfig {
    /// Custom endpoint for S3-compatible stores (MinIO and friends).
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

/// S3-backed object store. A client is built per operation from the resolved
/// credential record, decrypted on demand; no session is held between calls.
#[derive(Clone)]
pub struct AwsObjectStore {
    storage: FerryStorage,
    cipher: SecretCipher,
    config: AwsStoreConfig,
}

impl AwsObjectStore {
    pub fn new(storage: FerryStorage, cipher: SecretCipher, config: AwsStoreConfig) -> Self {
        Self {
            storage,
            cipher,
            config,
        }
    }

    /// Explicit account names resolve by lookup; an unnamed request is only
    /// unambiguous while a single credential record exists.
    async fn resolve(&self, account: Option<&str>) -> Result<CredentialRecord, ObjectStoreError> {
        match account {
            Some(name) => self
                .storage
                .find_credential(name)
                .await?
                .ok_or_else(|| ObjectStoreError::UnknownAccount(name.to_string())),
            None => {
                let mut records = self.storage.list_credentials().await?;
                match records.len() {
                    0 => Err(ObjectStoreError::NoCredentials),
                    1 => Ok(records.remove(0)),
                    n => Err(ObjectStoreError::AmbiguousAccount(n)),
                }
            }
        }
    }

    async fn client(&self, account: Option<&str>) -> Result<Client, ObjectStoreError> {
        let record = self.resolve(account).await?;
        let access_key = self.cipher.open(&record.access_key_encrypted)?;
        let secret_key = self.cipher.open(&record.secret_key_encrypted)?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "s3ferry-stored");
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(record.region))
            .credentials_provider(credentials)
            .force_path_style(self.config.force_path_style);
        if let Some(endpoint) = &self.config.endpoint_url {
            builder = builder.endpoint_url(endpoint.clone());
        }
        Ok(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl ObjectStore for AwsObjectStore {
    async fn list_objects(
        &self,
        account: Option<&str>,
        bucket: &str,
    ) -> Result<Vec<String>, ObjectStoreError> {
        let client = self.client(account).await?;
        let response = client
            .list_objects_v2()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| request_error("list objects", err))?;

        Ok(response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect())
    }

    async fn put_object(
        &self,
        account: Option<&str>,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), ObjectStoreError> {
        let client = self.client(account).await?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| request_error("upload object", err))?;

        info!(bucket = %bucket, key = %key, "object uploaded");
        Ok(())
    }

    async fn get_object(
        &self,
        account: Option<&str>,
        bucket: &str,
        key: &str,
    ) -> Result<Bytes, ObjectStoreError> {
        let client = self.client(account).await?;
        let response = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|service| service.is_no_such_key())
                    .unwrap_or(false)
                {
                    ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    request_error("download object", err)
                }
            })?;

        let aggregated = response
            .body
            .collect()
            .await
            .map_err(|err| request_error("download object", err))?;
        Ok(aggregated.into_bytes())
    }

    async fn copy_object(
        &self,
        account: Option<&str>,
        source_bucket: &str,
        destination_bucket: &str,
        key: &str,
    ) -> Result<(), ObjectStoreError> {
        let client = self.client(account).await?;
        client
            .copy_object()
            .copy_source(format!("{source_bucket}/{key}"))
            .bucket(destination_bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| request_error("copy object", err))?;

        info!(
            source = %source_bucket,
            destination = %destination_bucket,
            key = %key,
            "object copied"
        );
        Ok(())
    }

    async fn bucket_exists(
        &self,
        account: Option<&str>,
        bucket: &str,
    ) -> Result<bool, ObjectStoreError> {
        // Credential failures propagate; any probe failure reads as absent.
        let client = self.client(account).await?;
        Ok(client.head_bucket().bucket(bucket).send().await.is_ok())
    }

    async fn create_bucket(
        &self,
        account: Option<&str>,
        bucket: &str,
    ) -> Result<(), ObjectStoreError> {
        let client = self.client(account).await?;
        client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| request_error("create bucket", err))?;

        info!(bucket = %bucket, "bucket created");
        Ok(())
    }
}

fn request_error<E>(operation: &'static str, err: E) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ObjectStoreError::Request {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

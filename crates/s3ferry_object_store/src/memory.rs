use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::store::{ObjectStore, ObjectStoreError};

/// In-memory object store for tests and credential-free local runs. The
/// account parameter is ignored: there is no credential boundary to cross.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    buckets: Arc<RwLock<HashMap<String, HashMap<String, Bytes>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_object(&self, bucket: &str, key: &str, body: Bytes) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body);
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects(
        &self,
        _account: Option<&str>,
        bucket: &str,
    ) -> Result<Vec<String>, ObjectStoreError> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_object(
        &self,
        _account: Option<&str>,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), ObjectStoreError> {
        self.insert_object(bucket, key, body).await;
        Ok(())
    }

    async fn get_object(
        &self,
        _account: Option<&str>,
        bucket: &str,
        key: &str,
    ) -> Result<Bytes, ObjectStoreError> {
        self.object(bucket, key)
            .await
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn copy_object(
        &self,
        _account: Option<&str>,
        source_bucket: &str,
        destination_bucket: &str,
        key: &str,
    ) -> Result<(), ObjectStoreError> {
        let mut buckets = self.buckets.write().await;
        let body = buckets
            .get(source_bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: source_bucket.to_string(),
                key: key.to_string(),
            })?;

        buckets
            .entry(destination_bucket.to_string())
            .or_default()
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn bucket_exists(
        &self,
        _account: Option<&str>,
        _bucket: &str,
    ) -> Result<bool, ObjectStoreError> {
        Ok(true)
    }

    async fn create_bucket(
        &self,
        _account: Option<&str>,
        bucket: &str,
    ) -> Result<(), ObjectStoreError> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryObjectStore;
    use crate::store::{ObjectStore, ObjectStoreError};
    use bytes::Bytes;

    #[tokio::test]
    async fn put_list_get_round_trip() {
        let store = InMemoryObjectStore::new();
        store
            .put_object(None, "bkt", "reports/q1.pdf", Bytes::from_static(b"pdf"))
            .await
            .expect("put");

        let keys = store.list_objects(None, "bkt").await.expect("list");
        assert_eq!(keys, vec!["reports/q1.pdf".to_string()]);

        let body = store
            .get_object(None, "bkt", "reports/q1.pdf")
            .await
            .expect("get");
        assert_eq!(body, Bytes::from_static(b"pdf"));
    }

    #[tokio::test]
    async fn copy_duplicates_the_object() {
        let store = InMemoryObjectStore::new();
        store
            .insert_object("src", "key", Bytes::from_static(b"data"))
            .await;

        store
            .copy_object(None, "src", "dst", "key")
            .await
            .expect("copy");

        assert_eq!(
            store.object("dst", "key").await,
            Some(Bytes::from_static(b"data"))
        );
        assert_eq!(
            store.object("src", "key").await,
            Some(Bytes::from_static(b"data"))
        );
    }

    #[tokio::test]
    async fn copy_of_missing_key_fails() {
        let store = InMemoryObjectStore::new();
        let err = store
            .copy_object(None, "src", "dst", "missing")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ObjectStoreError::NotFound { bucket, key } if bucket == "src" && key == "missing"
        ));
    }

    #[tokio::test]
    async fn listing_an_unknown_bucket_is_empty() {
        let store = InMemoryObjectStore::new();
        let keys = store.list_objects(None, "nowhere").await.expect("list");
        assert!(keys.is_empty());
    }
}

//! Transfer orchestrator: validates submissions, persists the job before the
//! caller gets an id back, and hands the copy to a bounded worker pool.
//!
//! Submission passes an immutable work item over an mpsc queue; the worker
//! that dequeues it is the only writer of the job's terminal state, and the
//! store's `IN_PROGRESS` guard makes that write happen at most once.

use std::sync::Arc;
use std::time::Duration;

use s3ferry_object_store::ObjectStore;
use s3ferry_storage::{FerryStorage, TransferJobRecord};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::{TransferRequest, TransferStatus};

const ERROR_MESSAGE_MAX: usize = 1000;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("source bucket, destination bucket, and file key are required")]
    InvalidArgument,
    #[error("transfer job not found: {0}")]
    JobNotFound(String),
    #[error("transfer queue is not accepting jobs")]
    QueueClosed,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub workers: usize,
    pub queue_depth: usize,
    /// Upper bound on a single copy attempt; a hung copy fails the job
    /// instead of pinning it `IN_PROGRESS` forever.
    pub copy_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 64,
            copy_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
struct TransferWorkItem {
    job_id: String,
    account: Option<String>,
    source_bucket: String,
    destination_bucket: String,
    file_key: String,
}

pub struct TransferOrchestrator {
    storage: FerryStorage,
    queue: mpsc::Sender<TransferWorkItem>,
}

impl TransferOrchestrator {
    /// Spawns the worker pool. Workers drain the queue until every sender is
    /// dropped, then exit.
    pub fn start(
        storage: FerryStorage,
        object_store: Arc<dyn ObjectStore>,
        config: TransferConfig,
    ) -> Self {
        let (queue, receiver) = mpsc::channel(config.queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..config.workers.max(1) {
            let storage = storage.clone();
            let object_store = object_store.clone();
            let receiver = receiver.clone();
            let copy_timeout = config.copy_timeout;
            tokio::spawn(async move {
                run_worker(worker, storage, object_store, copy_timeout, receiver).await;
            });
        }

        Self { storage, queue }
    }

    /// Persists the job (`IN_PROGRESS`) and enqueues the copy; returns the
    /// job id without waiting on the copy. Polling the status is the only
    /// way to observe completion.
    pub async fn start_transfer(&self, request: TransferRequest) -> Result<String, TransferError> {
        validate(&request)?;

        let job = self
            .storage
            .create_transfer_job(
                request.account.as_deref(),
                &request.source_bucket,
                &request.destination_bucket,
                &request.file_key,
            )
            .await?;

        let item = TransferWorkItem {
            job_id: job.job_id.clone(),
            account: request.account,
            source_bucket: request.source_bucket,
            destination_bucket: request.destination_bucket,
            file_key: request.file_key,
        };

        if self.queue.send(item).await.is_err() {
            self.storage
                .complete_transfer_job(
                    &job.job_id,
                    TransferStatus::Failed.as_str(),
                    Some("transfer queue is not accepting jobs"),
                )
                .await?;
            return Err(TransferError::QueueClosed);
        }

        Ok(job.job_id)
    }

    /// Current persisted state of a job; a dirty read of in-flight jobs is
    /// expected and acceptable.
    pub async fn transfer_status(&self, job_id: &str) -> Result<TransferJobRecord, TransferError> {
        self.storage
            .get_transfer_job(job_id)
            .await?
            .ok_or_else(|| TransferError::JobNotFound(job_id.to_string()))
    }
}

fn validate(request: &TransferRequest) -> Result<(), TransferError> {
    let required = [
        &request.source_bucket,
        &request.destination_bucket,
        &request.file_key,
    ];
    if required.iter().any(|field| field.trim().is_empty()) {
        return Err(TransferError::InvalidArgument);
    }
    Ok(())
}

async fn run_worker(
    worker: usize,
    storage: FerryStorage,
    object_store: Arc<dyn ObjectStore>,
    copy_timeout: Duration,
    receiver: Arc<Mutex<mpsc::Receiver<TransferWorkItem>>>,
) {
    loop {
        // Lock only around the dequeue so the pool processes concurrently.
        let item = receiver.lock().await.recv().await;
        let Some(item) = item else {
            break;
        };

        if let Err(err) =
            execute_transfer(&storage, object_store.as_ref(), copy_timeout, &item).await
        {
            error!(worker, job_id = %item.job_id, error = %err, "transfer job bookkeeping failed");
        }
    }
}

/// One copy attempt followed by exactly one terminal write, whichever way the
/// attempt went. Failure is terminal; nothing retries.
async fn execute_transfer(
    storage: &FerryStorage,
    object_store: &dyn ObjectStore,
    copy_timeout: Duration,
    item: &TransferWorkItem,
) -> anyhow::Result<()> {
    info!(
        job_id = %item.job_id,
        source = %item.source_bucket,
        destination = %item.destination_bucket,
        key = %item.file_key,
        "starting transfer"
    );

    let copy = object_store.copy_object(
        item.account.as_deref(),
        &item.source_bucket,
        &item.destination_bucket,
        &item.file_key,
    );

    match tokio::time::timeout(copy_timeout, copy).await {
        Ok(Ok(())) => {
            storage
                .complete_transfer_job(&item.job_id, TransferStatus::Completed.as_str(), None)
                .await?;
            info!(job_id = %item.job_id, "transfer completed");
        }
        Ok(Err(err)) => {
            let message = truncate_error(&err.to_string());
            storage
                .complete_transfer_job(
                    &item.job_id,
                    TransferStatus::Failed.as_str(),
                    Some(&message),
                )
                .await?;
            error!(job_id = %item.job_id, error = %message, "transfer failed");
        }
        Err(_) => {
            let message = format!("copy timed out after {}s", copy_timeout.as_secs());
            storage
                .complete_transfer_job(
                    &item.job_id,
                    TransferStatus::Failed.as_str(),
                    Some(&message),
                )
                .await?;
            error!(job_id = %item.job_id, "transfer timed out");
        }
    }

    Ok(())
}

fn truncate_error(message: &str) -> String {
    if message.len() <= ERROR_MESSAGE_MAX {
        return message.to_string();
    }
    let mut end = ERROR_MESSAGE_MAX;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::{truncate_error, TransferConfig, TransferError, TransferOrchestrator};
    use crate::{TransferRequest, TransferStatus};
    use async_trait::async_trait;
    use bytes::Bytes;
    use s3ferry_object_store::{InMemoryObjectStore, ObjectStore, ObjectStoreError};
    use s3ferry_storage::{FerryStorage, StorageConfig, TransferJobRecord};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    async fn temp_storage() -> FerryStorage {
        let path = std::env::temp_dir().join(format!("s3ferry-transfer-{}.db", Uuid::now_v7()));
        FerryStorage::connect(&StorageConfig {
            sqlite_path: path.to_string_lossy().into_owned(),
        })
        .await
        .expect("connect temp sqlite")
    }

    fn request(source: &str, destination: &str, key: &str) -> TransferRequest {
        TransferRequest {
            source_bucket: source.to_string(),
            destination_bucket: destination.to_string(),
            file_key: key.to_string(),
            account: None,
        }
    }

    async fn await_terminal(
        orchestrator: &TransferOrchestrator,
        job_id: &str,
    ) -> TransferJobRecord {
        for _ in 0..200 {
            let record = orchestrator
                .transfer_status(job_id)
                .await
                .expect("job exists");
            if record.status != TransferStatus::InProgress.as_str() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_and_nothing_is_persisted() {
        let storage = temp_storage().await;
        let orchestrator = TransferOrchestrator::start(
            storage.clone(),
            Arc::new(InMemoryObjectStore::new()),
            TransferConfig::default(),
        );

        let err = orchestrator
            .start_transfer(request("bkt-a", "", "key"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidArgument));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transfer_jobs")
            .fetch_one(storage.pool())
            .await
            .expect("count jobs");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn job_is_visible_before_the_copy_finishes() {
        let storage = temp_storage().await;
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .insert_object("bkt-a", "reports/q1.pdf", Bytes::from_static(b"pdf"))
            .await;
        let orchestrator =
            TransferOrchestrator::start(storage, store, TransferConfig::default());

        let job_id = orchestrator
            .start_transfer(request("bkt-a", "bkt-b", "reports/q1.pdf"))
            .await
            .expect("submit");

        // Never NotFound right after submission, whatever state it is in.
        let record = orchestrator
            .transfer_status(&job_id)
            .await
            .expect("job visible immediately");
        assert!([
            TransferStatus::InProgress.as_str(),
            TransferStatus::Completed.as_str(),
            TransferStatus::Failed.as_str(),
        ]
        .contains(&record.status.as_str()));
    }

    #[tokio::test]
    async fn successful_copy_completes_the_job() {
        let storage = temp_storage().await;
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .insert_object("bkt-a", "reports/q1.pdf", Bytes::from_static(b"pdf"))
            .await;
        let orchestrator =
            TransferOrchestrator::start(storage, store.clone(), TransferConfig::default());

        let job_id = orchestrator
            .start_transfer(request("bkt-a", "bkt-b", "reports/q1.pdf"))
            .await
            .expect("submit");

        let record = await_terminal(&orchestrator, &job_id).await;
        assert_eq!(record.status, TransferStatus::Completed.as_str());
        assert!(record.completed_at.is_some());
        assert!(record.error_message.is_none());
        assert!(store.object("bkt-b", "reports/q1.pdf").await.is_some());
    }

    #[tokio::test]
    async fn failed_copy_records_the_error() {
        let storage = temp_storage().await;
        let orchestrator = TransferOrchestrator::start(
            storage,
            Arc::new(InMemoryObjectStore::new()),
            TransferConfig::default(),
        );

        let job_id = orchestrator
            .start_transfer(request("bkt-a", "bkt-b", "missing.pdf"))
            .await
            .expect("submit");

        let record = await_terminal(&orchestrator, &job_id).await;
        assert_eq!(record.status, TransferStatus::Failed.as_str());
        assert!(record.completed_at.is_some());
        let message = record.error_message.expect("error message recorded");
        assert!(message.contains("missing.pdf"));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let storage = temp_storage().await;
        let orchestrator = TransferOrchestrator::start(
            storage,
            Arc::new(InMemoryObjectStore::new()),
            TransferConfig::default(),
        );

        let err = orchestrator
            .transfer_status("0198c0de-0000-7000-8000-000000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn identical_requests_get_independent_jobs() {
        let storage = temp_storage().await;
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .insert_object("bkt-a", "key", Bytes::from_static(b"data"))
            .await;
        let orchestrator =
            TransferOrchestrator::start(storage, store, TransferConfig::default());

        let first = orchestrator
            .start_transfer(request("bkt-a", "bkt-b", "key"))
            .await
            .expect("submit");
        let second = orchestrator
            .start_transfer(request("bkt-a", "bkt-b", "key"))
            .await
            .expect("submit");

        assert_ne!(first, second);
        assert!(orchestrator.transfer_status(&first).await.is_ok());
        assert!(orchestrator.transfer_status(&second).await.is_ok());
    }

    struct HangingObjectStore;

    #[async_trait]
    impl ObjectStore for HangingObjectStore {
        async fn list_objects(
            &self,
            _account: Option<&str>,
            _bucket: &str,
        ) -> Result<Vec<String>, ObjectStoreError> {
            Ok(Vec::new())
        }

        async fn put_object(
            &self,
            _account: Option<&str>,
            _bucket: &str,
            _key: &str,
            _body: Bytes,
        ) -> Result<(), ObjectStoreError> {
            Ok(())
        }

        async fn get_object(
            &self,
            _account: Option<&str>,
            bucket: &str,
            key: &str,
        ) -> Result<Bytes, ObjectStoreError> {
            Err(ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        }

        async fn copy_object(
            &self,
            _account: Option<&str>,
            _source_bucket: &str,
            _destination_bucket: &str,
            _key: &str,
        ) -> Result<(), ObjectStoreError> {
            std::future::pending().await
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
            _bucket: &str,
        ) -> Result<(), ObjectStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn hung_copy_fails_after_the_timeout() {
        let storage = temp_storage().await;
        let orchestrator = TransferOrchestrator::start(
            storage,
            Arc::new(HangingObjectStore),
            TransferConfig {
                copy_timeout: Duration::from_millis(50),
                ..TransferConfig::default()
            },
        );

        let job_id = orchestrator
            .start_transfer(request("bkt-a", "bkt-b", "key"))
            .await
            .expect("submit");

        let record = await_terminal(&orchestrator, &job_id).await;
        assert_eq!(record.status, TransferStatus::Failed.as_str());
        let message = record.error_message.expect("error message recorded");
        assert!(message.contains("timed out"));
    }

    #[test]
    fn long_errors_are_truncated() {
        let long = "x".repeat(5000);
        assert_eq!(truncate_error(&long).len(), 1000);
        assert_eq!(truncate_error("short"), "short");
    }
}

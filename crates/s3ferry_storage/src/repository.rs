use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct FerryStorage {
    pool: SqlitePool,
}

/// One requested bucket-to-bucket copy and its outcome.
///
/// `status` holds one of `IN_PROGRESS`, `COMPLETED`, `FAILED`; the typed enum
/// lives in the transfer crate, the store itself is stringly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransferJobRecord {
    pub job_id: String,
    pub account: Option<String>,
    pub source_bucket: String,
    pub destination_bucket: String,
    pub file_key: String,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CredentialRecord {
    pub credential_id: String,
    pub account_name: String,
    pub region: String,
    pub access_key_encrypted: String,
    pub secret_key_encrypted: String,
    pub created_at: String,
}

impl FerryStorage {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let uri = normalize_sqlite_uri(&config.sqlite_path);
        let options = SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {}", uri))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect sqlite pool")?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration failed for statement: {sql}"))?;
        }
        info!("s3ferry sqlite schema ready");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_transfer_job(
        &self,
        account: Option<&str>,
        source_bucket: &str,
        destination_bucket: &str,
        file_key: &str,
    ) -> Result<TransferJobRecord> {
        let now = Utc::now().to_rfc3339();
        let job_id = Uuid::now_v7().to_string();

        sqlx::query(
            "INSERT INTO transfer_jobs(job_id, account, source_bucket, destination_bucket, file_key, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job_id)
        .bind(account)
        .bind(source_bucket)
        .bind(destination_bucket)
        .bind(file_key)
        .bind("IN_PROGRESS")
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("insert transfer job")?;

        self.get_transfer_job(&job_id)
            .await?
            .context("transfer job missing after insert")
    }

    pub async fn get_transfer_job(&self, job_id: &str) -> Result<Option<TransferJobRecord>> {
        sqlx::query_as::<_, TransferJobRecord>(
            "SELECT job_id, account, source_bucket, destination_bucket, file_key, status, error_message, created_at, completed_at FROM transfer_jobs WHERE job_id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query transfer job {job_id}"))
    }

    /// Writes the terminal state of a job. The `IN_PROGRESS` guard keeps
    /// terminal states final: a second write is a no-op and returns false.
    pub async fn complete_transfer_job(
        &self,
        job_id: &str,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE transfer_jobs SET status = ?, error_message = ?, completed_at = ? WHERE job_id = ? AND status = 'IN_PROGRESS'",
        )
        .bind(status)
        .bind(error_message)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("complete transfer job {job_id}"))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn save_credential(
        &self,
        account_name: &str,
        region: &str,
        access_key_encrypted: &str,
        secret_key_encrypted: &str,
    ) -> Result<CredentialRecord> {
        let now = Utc::now().to_rfc3339();
        let credential_id = Uuid::now_v7().to_string();

        sqlx::query(
            "INSERT INTO credentials(credential_id, account_name, region, access_key_encrypted, secret_key_encrypted, created_at) VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT(account_name) DO UPDATE SET region = excluded.region, access_key_encrypted = excluded.access_key_encrypted, secret_key_encrypted = excluded.secret_key_encrypted",
        )
        .bind(&credential_id)
        .bind(account_name)
        .bind(region)
        .bind(access_key_encrypted)
        .bind(secret_key_encrypted)
        .bind(&now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("save credential for account {account_name}"))?;

        self.find_credential(account_name)
            .await?
            .context("credential missing after save")
    }

    pub async fn find_credential(&self, account_name: &str) -> Result<Option<CredentialRecord>> {
        sqlx::query_as::<_, CredentialRecord>(
            "SELECT credential_id, account_name, region, access_key_encrypted, secret_key_encrypted, created_at FROM credentials WHERE account_name = ?",
        )
        .bind(account_name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query credential for account {account_name}"))
    }

    pub async fn list_credentials(&self) -> Result<Vec<CredentialRecord>> {
        sqlx::query_as::<_, CredentialRecord>(
            "SELECT credential_id, account_name, region, access_key_encrypted, secret_key_encrypted, created_at FROM credentials ORDER BY account_name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("query credentials")
    }
}

fn normalize_sqlite_uri(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}

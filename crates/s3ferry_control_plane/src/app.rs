use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use s3ferry_object_store::{ObjectStore, ObjectStoreError};
use s3ferry_storage::{FerryStorage, SecretCipher};
use s3ferry_transfer::{TransferError, TransferOrchestrator, TransferRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub storage: FerryStorage,
    pub object_store: Arc<dyn ObjectStore>,
    pub orchestrator: Arc<TransferOrchestrator>,
    pub cipher: SecretCipher,
    pub openapi_doc: Arc<String>,
}

impl AppState {
    pub fn new(
        storage: FerryStorage,
        object_store: Arc<dyn ObjectStore>,
        orchestrator: Arc<TransferOrchestrator>,
        cipher: SecretCipher,
        openapi_doc: String,
    ) -> Self {
        Self {
            storage,
            object_store,
            orchestrator,
            cipher,
            openapi_doc: Arc::new(openapi_doc),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveCredentialRequest {
    account_name: String,
    access_key: String,
    secret_key: String,
    region: String,
}

/// Credential projection for listings: never key material, encrypted or not.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    credential_id: String,
    account_name: String,
    region: String,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct AccountQuery {
    account: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_banner))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/api/docs/openapi", get(get_openapi))
        .route("/api/auth/login", post(login))
        .route("/api/admin/aws", get(list_credentials).post(save_credentials))
        .route("/api/s3/{bucket}/files", get(list_files))
        .route("/api/s3/{bucket}/upload", post(upload_file))
        .route("/api/s3/{bucket}/download/{*key}", get(download_file))
        .route("/api/transfer", post(start_transfer))
        .route("/api/transfer/{job_id}", get(get_transfer_job))
        .route("/api/transfer/{job_id}/status", get(get_transfer_status))
        .with_state(state)
}

async fn service_banner() -> impl IntoResponse {
    "s3ferry bucket file transfer service is running"
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.storage.ping().await.is_ok();
    let payload = Json(json!({
        "status": if ready { "ready" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339()
    }));

    if ready {
        (StatusCode::OK, payload).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, payload).into_response()
    }
}

async fn get_openapi(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/yaml")],
        state.openapi_doc.as_ref().clone(),
    )
}

async fn login(Json(request): Json<LoginRequest>) -> impl IntoResponse {
    // Placeholder check; real identity management is out of scope.
    if request.username == "admin" && request.password == "password" {
        (
            StatusCode::OK,
            Json(json!({ "token": format!("session-{}", Uuid::now_v7()) })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_credentials" })),
        )
    }
}

async fn save_credentials(
    State(state): State<AppState>,
    Json(request): Json<SaveCredentialRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let access_key_encrypted = state
        .cipher
        .seal(&request.access_key)
        .map_err(|err| internal_error(err.into()))?;
    let secret_key_encrypted = state
        .cipher
        .seal(&request.secret_key)
        .map_err(|err| internal_error(err.into()))?;

    let record = state
        .storage
        .save_credential(
            &request.account_name,
            &request.region,
            &access_key_encrypted,
            &secret_key_encrypted,
        )
        .await
        .map_err(internal_error)?;

    info!(account = %record.account_name, "object-store credentials saved");
    Ok((
        StatusCode::OK,
        Json(json!({
            "credentialId": record.credential_id,
            "accountName": record.account_name,
            "region": record.region
        })),
    ))
}

async fn list_credentials(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let records = state
        .storage
        .list_credentials()
        .await
        .map_err(internal_error)?;

    let items: Vec<StoredCredential> = records
        .into_iter()
        .map(|record| StoredCredential {
            credential_id: record.credential_id,
            account_name: record.account_name,
            region: record.region,
            created_at: record.created_at,
        })
        .collect();
    Ok((StatusCode::OK, Json(items)))
}

async fn list_files(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let account = query.account.as_deref();

    match state.object_store.bucket_exists(account, &bucket).await {
        Ok(true) => {}
        Ok(false) => return Err(bad_request(&format!("bucket does not exist: {bucket}"))),
        Err(err) => return Err(object_store_error(err)),
    }

    let keys = state
        .object_store
        .list_objects(account, &bucket)
        .await
        .map_err(object_store_error)?;
    Ok((StatusCode::OK, Json(keys)))
}

async fn upload_file(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<AccountQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let mut body: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut key_override: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(&format!("invalid multipart payload: {err}")))?
    {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().map(str::to_string);
                body = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| bad_request(&format!("failed to read upload: {err}")))?,
                );
            }
            Some("key") => {
                key_override = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| bad_request(&format!("failed to read key field: {err}")))?,
                );
            }
            _ => {}
        }
    }

    let body = body.ok_or_else(|| bad_request("multipart field 'file' is required"))?;
    let key = key_override
        .filter(|key| !key.trim().is_empty())
        .or(file_name)
        .ok_or_else(|| bad_request("upload needs a key or an original file name"))?;

    let account = query.account.as_deref();
    if !state
        .object_store
        .bucket_exists(account, &bucket)
        .await
        .map_err(object_store_error)?
    {
        state
            .object_store
            .create_bucket(account, &bucket)
            .await
            .map_err(object_store_error)?;
    }

    state
        .object_store
        .put_object(account, &bucket, &key, body)
        .await
        .map_err(object_store_error)?;

    info!(bucket = %bucket, key = %key, "file uploaded");
    Ok((
        StatusCode::OK,
        Json(json!({ "message": format!("file uploaded successfully: {key}") })),
    ))
}

async fn download_file(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<AccountQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let body = state
        .object_store
        .get_object(query.account.as_deref(), &bucket, &key)
        .await
        .map_err(object_store_error)?;

    let file_name = key.rsplit('/').next().unwrap_or(&key);
    Ok((
        StatusCode::OK,
        [
            (
                CONTENT_TYPE,
                mime::APPLICATION_OCTET_STREAM.as_ref().to_string(),
            ),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    ))
}

async fn start_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    match state.orchestrator.start_transfer(request).await {
        Ok(job_id) => Ok((StatusCode::OK, Json(job_id))),
        Err(TransferError::Storage(err)) => Err(internal_error(err)),
        Err(err) => Err(bad_request(&format!("transfer failed: {err}"))),
    }
}

async fn get_transfer_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    match state.orchestrator.transfer_status(&job_id).await {
        Ok(record) => Ok((StatusCode::OK, Json(record))),
        Err(TransferError::JobNotFound(_)) => Err(not_found("transfer_job_not_found")),
        Err(TransferError::Storage(err)) => Err(internal_error(err)),
        Err(err) => Err(bad_request(&err.to_string())),
    }
}

/// Bare status string, as the polling clients expect; the full projection
/// with error detail lives one path segment up.
async fn get_transfer_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    match state.orchestrator.transfer_status(&job_id).await {
        Ok(record) => Ok((StatusCode::OK, Json(record.status))),
        Err(TransferError::JobNotFound(_)) => Err(not_found("transfer_job_not_found")),
        Err(TransferError::Storage(err)) => Err(internal_error(err)),
        Err(err) => Err(bad_request(&err.to_string())),
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found(code: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": code })))
}

fn internal_error(error: anyhow::Error) -> (StatusCode, Json<Value>) {
    error!(error = %error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "detail": error.to_string() })),
    )
}

fn object_store_error(error: ObjectStoreError) -> (StatusCode, Json<Value>) {
    match &error {
        ObjectStoreError::NoCredentials => bad_request(
            "no object-store credentials configured; save credentials via /api/admin/aws first",
        ),
        ObjectStoreError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": error.to_string() })))
        }
        ObjectStoreError::Storage(_) | ObjectStoreError::Credential(_) => {
            error!(error = %error, "object store request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error", "detail": error.to_string() })),
            )
        }
        _ => bad_request(&error.to_string()),
    }
}

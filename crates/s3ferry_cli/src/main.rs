use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use s3ferry_control_plane::{build_router, AppState};
use s3ferry_object_store::{AwsObjectStore, AwsStoreConfig, ObjectStore};
use s3ferry_storage::{FerryStorage, SecretCipher, StorageConfig};
use s3ferry_transfer::{TransferConfig, TransferOrchestrator};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "s3ferry bucket-to-bucket transfer daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        #[arg(long, default_value = "config/node.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    http: HttpSection,
    storage: StorageSection,
    #[serde(default)]
    encryption: EncryptionSection,
    #[serde(default)]
    object_store: ObjectStoreSection,
    #[serde(default)]
    transfer: TransferSection,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpSection {
    bind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    sqlite_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EncryptionSection {
    key_base64: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ObjectStoreSection {
    endpoint_url: Option<String>,
    #[serde(default)]
    force_path_style: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TransferSection {
    #[serde(default = "default_workers")]
    workers: usize,
    #[serde(default = "default_queue_depth")]
    queue_depth: usize,
    #[serde(default = "default_copy_timeout_secs")]
    copy_timeout_secs: u64,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            copy_timeout_secs: default_copy_timeout_secs(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

fn default_copy_timeout_secs() -> u64 {
    300
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config_source = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    let config: RuntimeConfig = toml::from_str(&config_source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))?;

    let storage = FerryStorage::connect(&StorageConfig {
        sqlite_path: config.storage.sqlite_path.clone(),
    })
    .await?;

    let cipher = match &config.encryption.key_base64 {
        Some(encoded) => {
            SecretCipher::from_base64(encoded).context("invalid encryption.key_base64")?
        }
        None => {
            warn!("no encryption key configured: stored credentials will not survive a restart");
            SecretCipher::generate().context("failed to generate encryption key")?
        }
    };

    let openapi_doc = std::fs::read_to_string("contracts/s3ferry-v1.openapi.yaml")
        .context("failed to load contracts/s3ferry-v1.openapi.yaml")?;

    let object_store: Arc<dyn ObjectStore> = Arc::new(AwsObjectStore::new(
        storage.clone(),
        cipher.clone(),
        AwsStoreConfig {
            endpoint_url: config.object_store.endpoint_url.clone(),
            force_path_style: config.object_store.force_path_style,
        },
    ));

    let orchestrator = Arc::new(TransferOrchestrator::start(
        storage.clone(),
        object_store.clone(),
        TransferConfig {
            workers: config.transfer.workers,
            queue_depth: config.transfer.queue_depth,
            copy_timeout: Duration::from_secs(config.transfer.copy_timeout_secs),
        },
    ));

    let state = AppState::new(storage, object_store, orchestrator, cipher, openapi_doc);
    let app = build_router(state);

    let socket: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid socket address {}", config.http.bind))?;

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "s3ferryd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("axum server failed")
}

use std::path::PathBuf;

use anyhow::Result;
use tracing::{error, info};

use vibelab_sandbox::jobs::preview::{process_preview_job, PreviewResult};
use vibelab_sandbox::jobs::WorkerJob;
use vibelab_sandbox::redis_manager::RedisManager;
use vibelab_sandbox::sandbox::{self, SandboxConfig};
use vibelab_sandbox::storage::StorageClient;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vibelab_sandbox=info".parse()?),
        )
        .init();

    info!("Starting Sandbox Worker...");

    let config = SandboxConfig::from_env();
    info!(
        "Sandbox config: max_document_bytes={}, state_request_timeout_ms={}, iframe_sandbox={:?}",
        config.max_document_bytes, config.state_request_timeout_ms, config.iframe_sandbox
    );
    sandbox::init_config(config)?;

    // Load denylist (embedded rules unless overridden)
    let denylist_path = std::env::var("DENYLIST_CONFIG").ok().map(PathBuf::from);
    sandbox::init_denylist(denylist_path.as_deref())?;
    match &denylist_path {
        Some(path) => info!("Loaded denylist from {}", path.display()),
        None => info!("Loaded embedded denylist"),
    }
    info!("Denylist has {} rules", sandbox::get_denylist().rules().len());

    let mut redis = RedisManager::from_env().await?;

    let storage = StorageClient::from_env().await?;
    info!("Connected to MinIO storage");

    info!("Waiting for jobs...");

    loop {
        let job = redis.pop_job().await?;

        match job {
            WorkerJob::Preview(job) => {
                info!(
                    "Received preview job: request_id={}, bytes={}",
                    job.request_id,
                    job.code.len()
                );

                let result = match process_preview_job(&job, &storage).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Failed to process preview job {}: {:#}", job.request_id, e);
                        PreviewResult::system_error(&job.request_id, format!("{:#}", e))
                    }
                };

                info!(
                    "Preview job completed: request_id={}, success={}",
                    result.request_id, result.success
                );

                if let Err(e) = redis.store_preview_result(&result).await {
                    error!("Failed to store preview result {}: {:#}", result.request_id, e);
                }
            }
        }
    }
}

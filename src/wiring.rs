//! Startup wiring shared by the server and the one-shot runner.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::services::callback::{CallbackError, HttpNotifier};
use crate::services::orchestrator::Orchestrator;
use crate::services::stages::{GenerationError, Stages};
use crate::services::storage::{S3Gateway, StorageError};

/// Build the orchestrator with the S3 gateway, HTTP callbacks and the
/// stage implementations selected by `config`.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator, StartupError> {
    tracing::info!(bucket = %config.s3_bucket, region = %config.aws_region, "Initializing S3 gateway");
    let store = S3Gateway::new(
        &config.s3_bucket,
        &config.aws_region,
        config.s3_endpoint.as_deref(),
        config.aws_access_key_id.as_deref(),
        config.aws_secret_access_key.as_deref(),
    )?;

    tracing::info!(
        segmentation = ?config.segmentation,
        remote_detector = config.detector_url.is_some(),
        remote_generator = config.generator_url.is_some(),
        "Initializing pipeline stages"
    );
    let stages = Stages::from_config(config)?;

    let notifier = HttpNotifier::new(Duration::from_secs(config.callback_timeout_secs))?;

    Ok(Orchestrator::new(
        Arc::new(store),
        stages,
        Arc::new(notifier),
        &config.download_dir,
        &config.output_dir,
    )
    .with_max_concurrent_jobs(config.max_concurrent_jobs))
}

/// Whether an NVIDIA driver is loaded on this host.
pub fn detect_gpu() -> bool {
    std::path::Path::new("/proc/driver/nvidia/version").exists()
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Stage setup failed: {0}")]
    Stages(#[from] GenerationError),

    #[error("Callback client setup failed: {0}")]
    Callback(#[from] CallbackError),
}

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::models::job::{is_http_url, Job, JobRequest, ValidationError};
use crate::models::outcome::JobOutcome;
use crate::services::callback::Notifier;
use crate::services::stages::{imaging, GenerationError, Stages};
use crate::services::storage::{ObjectStore, StorageError};

/// User-facing message for a guardrail rejection.
pub const PEOPLE_DETECTED: &str = "Image contains people. Please upload only pet photos.";

/// Runs one job through download, guardrail, segmentation, generation,
/// watermark and upload, then reports the outcome to the job's callback.
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    stages: Stages,
    notifier: Arc<dyn Notifier>,
    download_dir: PathBuf,
    output_dir: PathBuf,
    permits: Semaphore,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        stages: Stages,
        notifier: Arc<dyn Notifier>,
        download_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            stages,
            notifier,
            download_dir: download_dir.into(),
            output_dir: output_dir.into(),
            permits: Semaphore::new(1),
        }
    }

    /// Bound the number of pipelines running at once. Extra jobs wait for a slot.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.permits = Semaphore::new(max.max(1));
        self
    }

    /// Stop admitting jobs. Running pipelines finish; waiting and later jobs
    /// fail as unavailable and still get their callback.
    pub fn shutdown(&self) {
        tracing::info!("Closing job pool");
        self.permits.close();
    }

    /// Validate and run a request. Never fails: errors become a failed outcome.
    pub async fn run(&self, request: JobRequest) -> JobOutcome {
        metrics::counter!("generation_jobs_total").increment(1);

        match request.validate() {
            Ok(job) => self.run_job(&job).await,
            Err(e) => {
                let err = JobError::from(e);
                tracing::warn!(job_id = ?request.job_id, error = %err, "Rejected job request");
                metrics::counter!("generation_jobs_failed", "kind" => err.kind()).increment(1);

                let outcome = JobOutcome::failed(request.job_id.clone(), err.to_string());
                match request.callback_url.as_deref() {
                    Some(url) if is_http_url(url) => self.send_callback(url, &outcome).await,
                    Some(url) => {
                        tracing::warn!(callback_url = %url, "Callback URL is not http(s), skipping callback")
                    }
                    None => {}
                }
                outcome
            }
        }
    }

    /// Run an already validated job.
    pub async fn run_job(&self, job: &Job) -> JobOutcome {
        tracing::info!(
            job_id = %job.job_id,
            pet_type = %job.pet_type,
            images = job.image_keys.len(),
            watermark = job.watermark,
            "Received job"
        );

        let result = match self.permits.acquire().await {
            Ok(_permit) => {
                metrics::gauge!("generation_jobs_in_flight").increment(1.0);
                let start = Instant::now();

                let workspace = Workspace::new(&self.download_dir, &self.output_dir, &job.job_id);
                let result = self.execute(job, &workspace).await;
                workspace.cleanup(&job.job_id).await;

                metrics::histogram!("generation_processing_seconds")
                    .record(start.elapsed().as_secs_f64());
                metrics::gauge!("generation_jobs_in_flight").decrement(1.0);
                result
            }
            Err(_) => Err(JobError::Unavailable),
        };

        let outcome = match result {
            Ok(result_key) => {
                tracing::info!(job_id = %job.job_id, result_key = %result_key, "Job completed");
                metrics::counter!("generation_jobs_completed").increment(1);
                JobOutcome::succeeded(job.job_id.clone(), result_key)
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job.job_id,
                    kind = err.kind(),
                    error = %err,
                    "Job failed"
                );
                metrics::counter!("generation_jobs_failed", "kind" => err.kind()).increment(1);
                JobOutcome::failed(Some(job.job_id.clone()), err.to_string())
            }
        };

        self.send_callback(&job.callback_url, &outcome).await;
        outcome
    }

    async fn execute(&self, job: &Job, workspace: &Workspace) -> Result<String, JobError> {
        // One directory per input: keys may share a file name.
        let mut paths = Vec::with_capacity(job.image_keys.len());
        for (index, key) in job.image_keys.iter().enumerate() {
            let dir = workspace.scratch.join(index.to_string());
            paths.push(self.store.fetch(key, &dir).await?);
        }

        let images = run_blocking(move || {
            paths
                .iter()
                .map(|path| imaging::decode_file(path))
                .collect::<Result<Vec<DynamicImage>, _>>()
        })
        .await?;

        // Compliance gate: nothing below runs if any input shows a person.
        for (key, image) in job.image_keys.iter().zip(&images) {
            if self.stages.detector.contains_people(image).await? {
                tracing::warn!(job_id = %job.job_id, key = %key, "People detected in input image");
                return Err(JobError::Compliance { key: key.clone() });
            }
        }

        let segmenter = Arc::clone(&self.stages.segmenter);
        let segmented = run_blocking(move || {
            images
                .into_iter()
                .map(|image| segmenter.segment(image))
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;
        tracing::debug!(job_id = %job.job_id, count = segmented.len(), "Segmentation complete");

        let mut output = self
            .stages
            .generator
            .generate(&segmented, job.pet_type, job.breed.as_deref())
            .await?;

        if job.watermark {
            let watermarker = Arc::clone(&self.stages.watermarker);
            output = run_blocking(move || watermarker.apply(output)).await?;
        }

        let encoded = run_blocking(move || imaging::encode_jpeg(&output)).await?;
        let output_path = &workspace.output;
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(GenerationError::from)?;
        tokio::fs::write(output_path, encoded)
            .await
            .map_err(GenerationError::from)?;
        tracing::debug!(job_id = %job.job_id, path = %output_path.display(), "Saved result");

        let key = self.store.store(output_path, &job.result_key()).await?;
        Ok(key)
    }

    async fn send_callback(&self, url: &str, outcome: &JobOutcome) {
        let Some(payload) = outcome.callback_payload() else {
            tracing::warn!(callback_url = %url, "No job_id to report, skipping callback");
            return;
        };

        match self.notifier.notify(url, &payload).await {
            Ok(()) => {
                tracing::debug!(job_id = %payload.job_id, success = payload.success, "Callback delivered")
            }
            Err(e) => {
                metrics::counter!("generation_callbacks_failed").increment(1);
                tracing::error!(
                    job_id = %payload.job_id,
                    callback_url = %url,
                    error = %e,
                    "Failed to call back"
                );
            }
        }
    }
}

/// Local files of one job run. Each run gets fresh paths, so jobs whose IDs
/// sanitise to the same name, or the same job submitted twice, never share them.
struct Workspace {
    scratch: PathBuf,
    output: PathBuf,
}

impl Workspace {
    fn new(download_dir: &Path, output_dir: &Path, job_id: &str) -> Self {
        let name = format!("{}-{}", path_safe(job_id), uuid::Uuid::new_v4());
        Self {
            scratch: download_dir.join(&name),
            output: output_dir.join(format!("{}.jpg", name)),
        }
    }

    async fn cleanup(&self, job_id: &str) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch).await {
            log_cleanup_error(job_id, &self.scratch, e);
        }
        if let Err(e) = tokio::fs::remove_file(&self.output).await {
            log_cleanup_error(job_id, &self.output, e);
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, GenerationError>
where
    F: FnOnce() -> Result<T, GenerationError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn log_cleanup_error(job_id: &str, path: &Path, e: std::io::Error) {
    if e.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(job_id = %job_id, path = %path.display(), error = %e, "Failed to clean up scratch file");
    }
}

/// Readable, filesystem-safe form of a job ID for local file names.
fn path_safe(job_id: &str) -> String {
    let cleaned: String = job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Image contains people. Please upload only pet photos.")]
    Compliance { key: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Worker is shutting down")]
    Unavailable,
}

impl JobError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::Compliance { .. } => "compliance",
            JobError::Storage(_) => "storage",
            JobError::Generation(_) => "generation",
            JobError::Unavailable => "unavailable",
        }
    }
}

use serde::Deserialize;
use std::path::PathBuf;

use crate::services::stages::segmentation::SegmentationMode;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bucket holding both the uploaded inputs and the generated results
    #[serde(default = "default_bucket")]
    pub s3_bucket: String,

    /// AWS region name, or the signing region for a custom endpoint
    #[serde(default = "default_region")]
    pub aws_region: String,

    /// Custom S3-compatible endpoint (R2, MinIO). Uses path-style addressing when set.
    pub s3_endpoint: Option<String>,

    /// Access key ID. Falls back to the ambient AWS credential chain when unset.
    pub aws_access_key_id: Option<String>,

    /// Secret access key
    pub aws_secret_access_key: Option<String>,

    /// Scratch root for downloaded inputs; each job gets its own subdirectory
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Directory the encoded result is written to before upload
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum number of pipelines running at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,

    /// People-detection endpoint. The guardrail is a no-op stub when unset.
    pub detector_url: Option<String>,

    /// Inference endpoint for generation. The passthrough generator is used when unset.
    pub generator_url: Option<String>,

    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    #[serde(default)]
    pub segmentation: SegmentationMode,

    /// Per-channel colour distance still counted as background
    #[serde(default = "default_segmentation_tolerance")]
    pub segmentation_tolerance: u8,

    #[serde(default = "default_watermark_text")]
    pub watermark_text: String,

    /// Glyph atlas image (16x6 grid of ASCII 0x20..=0x7F) for the watermark label
    pub watermark_font_atlas: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_bucket() -> String {
    "baby-pet-uploads".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("/tmp/downloads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/outputs")
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_callback_timeout_secs() -> u64 {
    10
}

fn default_generation_timeout_secs() -> u64 {
    300
}

fn default_segmentation_tolerance() -> u8 {
    32
}

fn default_watermark_text() -> String {
    "Kittypup".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

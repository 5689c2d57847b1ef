//! Run a single generation job from a JSON file, outside the HTTP server.
//!
//! Usage:
//!   run-job path/to/job.json
//!
//! The file holds the same body POST /generate accepts. The outcome is
//! printed as JSON and the exit code is non-zero when the job failed.

use kittypup_worker::{
    config::AppConfig,
    models::{job::JobRequest, outcome::GenerateResponse},
    wiring,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: run-job <job.json>");
            std::process::exit(2);
        }
    };

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let body = std::fs::read(&path).expect("Failed to read job file");
    let value: serde_json::Value = serde_json::from_slice(&body).expect("Job file is not JSON");
    let request = JobRequest::from_value(&value).expect("Job file is not a JSON object");

    let orchestrator =
        wiring::build_orchestrator(&config).expect("Failed to initialize generation pipeline");

    tracing::info!(path = %path, job_id = ?request.job_id, "Running job from file");
    let outcome = orchestrator.run(request).await;

    let response = GenerateResponse::from(&outcome);
    println!(
        "{}",
        serde_json::to_string_pretty(&response).expect("Failed to serialize outcome")
    );

    if !response.success {
        std::process::exit(1);
    }
}

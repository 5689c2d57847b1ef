use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use crate::app_state::AppState;
use crate::models::job::JobRequest;
use crate::models::outcome::{GenerateResponse, JobOutcome};

/// POST /generate: run one generation job to completion.
///
/// Always answers 200 (job succeeded) or 500 (anything else), including for
/// bodies that are not JSON at all.
pub async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<GenerateResponse>) {
    let request = match parse_body(&body) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(error = %error, "Unreadable job request");
            let outcome = JobOutcome::failed(None, error);
            return respond(&outcome);
        }
    };

    // Run detached so a dropped connection does not cancel the job or its callback.
    let orchestrator = state.orchestrator.clone();
    let job_id = request.job_id.clone();
    let outcome = match tokio::spawn(async move { orchestrator.run(request).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(job_id = ?job_id, error = %e, "Job task panicked");
            JobOutcome::failed(job_id, format!("Job task failed: {}", e))
        }
    };

    respond(&outcome)
}

fn parse_body(body: &[u8]) -> Result<JobRequest, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("Invalid JSON body: {}", e))?;
    JobRequest::from_value(&value).map_err(|e| e.to_string())
}

fn respond(outcome: &JobOutcome) -> (StatusCode, Json<GenerateResponse>) {
    let status = if outcome.result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(GenerateResponse::from(outcome)))
}

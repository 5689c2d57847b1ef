use serde::{Deserialize, Serialize};

/// Outcome of one pipeline run. Success and error never coexist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Succeeded { result_key: String },
    Failed { error: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Succeeded { .. })
    }
}

/// A [`JobResult`] together with the job it belongs to, when that could be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: Option<String>,
    pub result: JobResult,
}

impl JobOutcome {
    pub fn succeeded(job_id: impl Into<String>, result_key: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            result: JobResult::Succeeded {
                result_key: result_key.into(),
            },
        }
    }

    pub fn failed(job_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            result: JobResult::Failed {
                error: error.into(),
            },
        }
    }

    /// Payload for the submitter's callback. Requires a resolved job ID.
    pub fn callback_payload(&self) -> Option<CallbackPayload> {
        let job_id = self.job_id.clone()?;
        Some(match &self.result {
            JobResult::Succeeded { result_key } => CallbackPayload {
                job_id,
                success: true,
                result_key: Some(result_key.clone()),
                error: None,
            },
            JobResult::Failed { error } => CallbackPayload {
                job_id,
                success: false,
                result_key: None,
                error: Some(error.clone()),
            },
        })
    }
}

/// Response body for POST /generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&JobOutcome> for GenerateResponse {
    fn from(outcome: &JobOutcome) -> Self {
        match &outcome.result {
            JobResult::Succeeded { result_key } => Self {
                success: true,
                job_id: outcome.job_id.clone(),
                result_key: Some(result_key.clone()),
                error: None,
            },
            JobResult::Failed { error } => Self {
                success: false,
                job_id: outcome.job_id.clone(),
                result_key: None,
                error: Some(error.clone()),
            },
        }
    }
}

/// Body POSTed to the job's `callback_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub job_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::models::outcome::CallbackPayload;

/// Delivers job outcomes to the submitter.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError>;
}

/// POSTs the payload as JSON. Single attempt, no retries.
pub struct HttpNotifier {
    http: Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        let response = self.http.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Callback endpoint responded with status {0}")]
    Status(u16),
}

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{imaging, GenerationError, PeopleDetector};

/// Guardrail stub that never detects anyone.
///
/// Stands in until a real detector is configured; every image passes.
pub struct NoPeopleDetector;

impl NoPeopleDetector {
    pub fn new() -> Self {
        tracing::warn!("People detection is a stub: every image passes the guardrail");
        Self
    }
}

impl Default for NoPeopleDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeopleDetector for NoPeopleDetector {
    async fn contains_people(&self, _image: &DynamicImage) -> Result<bool, GenerationError> {
        Ok(false)
    }
}

/// People detection delegated to an HTTP detection service.
pub struct RemoteDetector {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct DetectRequest {
    image: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    contains_people: bool,
}

impl RemoteDetector {
    pub fn new(url: String) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl PeopleDetector for RemoteDetector {
    async fn contains_people(&self, image: &DynamicImage) -> Result<bool, GenerationError> {
        let request = DetectRequest {
            image: imaging::to_base64_png(image)?,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let detected: DetectResponse = response.json().await?;
        tracing::debug!(contains_people = detected.contains_people, "People detection complete");
        Ok(detected.contains_people)
    }
}

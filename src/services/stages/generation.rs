use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{imaging, GenerationError, Generator};
use crate::models::job::PetType;

const NEGATIVE_PROMPT: &str = "adult, old, human, person, face, deformed, ugly";

/// Text conditioning sent to the diffusion model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    pub prompt: String,
    pub negative_prompt: String,
}

impl GenerationPrompt {
    pub fn new(pet_type: PetType, breed: Option<&str>) -> Self {
        let prompt = match breed {
            Some(breed) => format!(
                "adorable {} baby, {} breed, fluffy, cute, professional photo",
                pet_type, breed
            ),
            None => format!("adorable {} baby, fluffy, cute, professional photo", pet_type),
        };
        Self {
            prompt,
            negative_prompt: NEGATIVE_PROMPT.to_string(),
        }
    }
}

/// Passthrough generation: returns the first reference image untouched.
///
/// Used when no inference service is wired in.
pub struct PassthroughGenerator;

#[async_trait]
impl Generator for PassthroughGenerator {
    async fn generate(
        &self,
        images: &[DynamicImage],
        pet_type: PetType,
        breed: Option<&str>,
    ) -> Result<DynamicImage, GenerationError> {
        let first = images.first().ok_or(GenerationError::NoInputs)?;
        let prompt = GenerationPrompt::new(pet_type, breed);
        tracing::info!(
            prompt = %prompt.prompt,
            references = images.len(),
            "Passthrough generation, returning first reference image"
        );
        Ok(first.clone())
    }
}

/// Generation delegated to an HTTP inference service.
///
/// The service receives the prompts and the reference images and answers
/// with one base64-encoded image.
pub struct RemoteGenerator {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    pet_type: PetType,
    breed: Option<&'a str>,
    reference_images: Vec<String>,
}

#[derive(Deserialize)]
struct InferenceResponse {
    image: String,
}

impl RemoteGenerator {
    pub fn new(url: String, timeout: Duration) -> Result<Self, GenerationError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Generator for RemoteGenerator {
    async fn generate(
        &self,
        images: &[DynamicImage],
        pet_type: PetType,
        breed: Option<&str>,
    ) -> Result<DynamicImage, GenerationError> {
        if images.is_empty() {
            return Err(GenerationError::NoInputs);
        }

        let prompt = GenerationPrompt::new(pet_type, breed);
        let reference_images = images
            .iter()
            .map(imaging::to_base64_png)
            .collect::<Result<Vec<_>, _>>()?;

        let request = InferenceRequest {
            prompt: &prompt.prompt,
            negative_prompt: &prompt.negative_prompt,
            pet_type,
            breed,
            reference_images,
        };

        tracing::info!(prompt = %prompt.prompt, references = images.len(), "Requesting generation");
        let start = std::time::Instant::now();

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: InferenceResponse = response.json().await?;

        tracing::info!(
            inference_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        imaging::from_base64(&body.image)
    }
}

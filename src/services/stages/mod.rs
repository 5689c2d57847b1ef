//! Swappable pipeline stages.
//!
//! Each stage is a trait with a passthrough implementation and a real one.
//! The concrete implementations are chosen once, when [`Stages`] is built.

pub mod font;
pub mod generation;
pub mod guardrail;
pub mod segmentation;
pub mod watermark;

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::job::PetType;

/// Compliance check run over every input image before any generation.
#[async_trait]
pub trait PeopleDetector: Send + Sync {
    async fn contains_people(&self, image: &DynamicImage) -> Result<bool, GenerationError>;
}

/// Foreground isolation. CPU-bound; called from the blocking pool.
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: DynamicImage) -> Result<DynamicImage, GenerationError>;
}

/// Produces one output image from the ordered reference images.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        images: &[DynamicImage],
        pet_type: PetType,
        breed: Option<&str>,
    ) -> Result<DynamicImage, GenerationError>;
}

/// Visible overlay on the final image. CPU-bound; called from the blocking pool.
pub trait Watermarker: Send + Sync {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, GenerationError>;
}

/// The stage implementations a pipeline runs with.
#[derive(Clone)]
pub struct Stages {
    pub detector: Arc<dyn PeopleDetector>,
    pub segmenter: Arc<dyn Segmenter>,
    pub generator: Arc<dyn Generator>,
    pub watermarker: Arc<dyn Watermarker>,
}

impl Stages {
    /// Stub guardrail, passthrough segmentation and generation, default text watermark.
    pub fn passthrough() -> Self {
        Self {
            detector: Arc::new(guardrail::NoPeopleDetector::new()),
            segmenter: Arc::new(segmentation::PassthroughSegmenter),
            generator: Arc::new(generation::PassthroughGenerator),
            watermarker: Arc::new(watermark::TextWatermark::with_builtin_font("Kittypup")),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GenerationError> {
        let detector: Arc<dyn PeopleDetector> = match &config.detector_url {
            Some(url) => Arc::new(guardrail::RemoteDetector::new(url.clone())?),
            None => Arc::new(guardrail::NoPeopleDetector::new()),
        };

        let segmenter = segmentation::from_mode(config.segmentation, config.segmentation_tolerance);

        let generator: Arc<dyn Generator> = match &config.generator_url {
            Some(url) => Arc::new(generation::RemoteGenerator::new(
                url.clone(),
                std::time::Duration::from_secs(config.generation_timeout_secs),
            )?),
            None => {
                tracing::warn!("No generator_url configured, using passthrough generation");
                Arc::new(generation::PassthroughGenerator)
            }
        };

        let watermarker = Arc::new(watermark::TextWatermark::load(
            &config.watermark_text,
            config.watermark_font_atlas.as_deref(),
        ));

        Ok(Self {
            detector,
            segmenter,
            generator,
            watermarker,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference service returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("No reference images to generate from")]
    NoInputs,

    #[error("Stage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),
}

pub mod imaging {
    //! Encoding helpers shared by the stages and the orchestrator.

    use base64::Engine;
    use image::codecs::jpeg::JpegEncoder;
    use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::Path;

    use super::GenerationError;

    pub const JPEG_QUALITY: u8 = 95;

    /// Decode by content, not by file extension; object keys need not carry one.
    pub fn decode_file(path: &Path) -> Result<DynamicImage, GenerationError> {
        Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
    }

    /// Encode as JPEG, flattening any transparency onto white.
    pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, GenerationError> {
        let rgb = flatten_onto_white(image);
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        encoder.encode_image(&rgb)?;
        Ok(out)
    }

    pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
        if !image.color().has_alpha() {
            return image.to_rgb8();
        }
        let rgba = image.to_rgba8();
        let mut rgb = RgbImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
            rgb.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
        }
        rgb
    }

    /// PNG bytes, base64-encoded, for JSON payloads to inference services.
    pub fn to_base64_png(image: &DynamicImage) -> Result<String, GenerationError> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
    }

    pub fn from_base64(encoded: &str) -> Result<DynamicImage, GenerationError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

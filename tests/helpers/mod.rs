//! Test doubles and fixtures for pipeline and HTTP tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kittypup_worker::models::job::PetType;
use kittypup_worker::models::outcome::CallbackPayload;
use kittypup_worker::services::callback::{CallbackError, Notifier};
use kittypup_worker::services::orchestrator::Orchestrator;
use kittypup_worker::services::stages::{
    GenerationError, Generator, PeopleDetector, Stages,
};
use kittypup_worker::services::storage::{file_name_for, ObjectStore, StorageError};

/// Top-left pixel colour that the marker detector treats as "a person".
pub const PERSON_MARKER: [u8; 3] = [255, 0, 0];

/// Object store held in memory, recording every call.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fetches: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(&self, key: &str, scratch_dir: &Path) -> Result<PathBuf, StorageError> {
        self.fetches.lock().unwrap().push(key.to_string());
        let data = self
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        tokio::fs::create_dir_all(scratch_dir).await?;
        let path = scratch_dir.join(file_name_for(key)?);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    async fn store(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        let data = tokio::fs::read(local_path).await?;
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), data.clone()));
        self.put(key, data);
        Ok(key.to_string())
    }
}

/// Records callbacks; optionally fails every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<(String, CallbackPayload)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(String, CallbackPayload)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        if self.fail {
            return Err(CallbackError::Status(503));
        }
        Ok(())
    }
}

/// Flags images whose top-left pixel is [`PERSON_MARKER`]; counts invocations.
#[derive(Default)]
pub struct MarkerDetector {
    pub checks: AtomicUsize,
}

impl MarkerDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeopleDetector for MarkerDetector {
    async fn contains_people(&self, image: &DynamicImage) -> Result<bool, GenerationError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(image.to_rgb8().get_pixel(0, 0).0 == PERSON_MARKER)
    }
}

/// Detector whose backing service is down.
pub struct UnreachableDetector;

#[async_trait]
impl PeopleDetector for UnreachableDetector {
    async fn contains_people(&self, _image: &DynamicImage) -> Result<bool, GenerationError> {
        Err(GenerationError::InvalidResponse("detector offline".to_string()))
    }
}

/// Generator that always fails, for error propagation tests.
pub struct BrokenGenerator;

#[async_trait]
impl Generator for BrokenGenerator {
    async fn generate(
        &self,
        _images: &[DynamicImage],
        _pet_type: PetType,
        _breed: Option<&str>,
    ) -> Result<DynamicImage, GenerationError> {
        Err(GenerationError::InvalidResponse("model crashed".to_string()))
    }
}

/// Passthrough generator that records the peak number of concurrent calls.
#[derive(Default)]
pub struct SlowGenerator {
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(
        &self,
        images: &[DynamicImage],
        _pet_type: PetType,
        _breed: Option<&str>,
    ) -> Result<DynamicImage, GenerationError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        images.first().cloned().ok_or(GenerationError::NoInputs)
    }
}

/// Lossless PNG bytes of a solid-colour image.
pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Unique scratch root for one test, removed on drop.
pub struct ScratchRoot(PathBuf);

impl ScratchRoot {
    pub fn new() -> Self {
        Self(std::env::temp_dir().join(format!("kittypup-test-{}", uuid::Uuid::new_v4())))
    }
}

impl std::ops::Deref for ScratchRoot {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchRoot {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}

/// Stages with the marker detector and passthrough everything else.
pub fn marker_stages(detector: Arc<MarkerDetector>) -> Stages {
    Stages {
        detector,
        ..Stages::passthrough()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub detector: Arc<MarkerDetector>,
    pub root: ScratchRoot,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        let detector = Arc::new(MarkerDetector::new());
        Self::build(notifier, marker_stages(detector.clone()), detector, 1)
    }

    pub fn with_stages(stages: Stages, max_concurrent_jobs: usize) -> Self {
        Self::build(
            RecordingNotifier::new(),
            stages,
            Arc::new(MarkerDetector::new()),
            max_concurrent_jobs,
        )
    }

    fn build(
        notifier: RecordingNotifier,
        stages: Stages,
        detector: Arc<MarkerDetector>,
        max_concurrent_jobs: usize,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let root = ScratchRoot::new();
        let orchestrator = Orchestrator::new(
            store.clone(),
            stages,
            notifier.clone(),
            root.join("downloads"),
            root.join("outputs"),
        )
        .with_max_concurrent_jobs(max_concurrent_jobs);

        Self {
            store,
            notifier,
            detector,
            root,
            orchestrator,
        }
    }
}

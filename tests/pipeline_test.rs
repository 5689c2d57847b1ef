//! Orchestrator behaviour against in-memory storage and recorded callbacks.

mod helpers;

use helpers::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use kittypup_worker::models::job::JobRequest;
use kittypup_worker::models::outcome::{CallbackPayload, JobResult};
use kittypup_worker::services::orchestrator::PEOPLE_DETECTED;
use kittypup_worker::services::stages::Stages;

fn request(body: serde_json::Value) -> JobRequest {
    JobRequest::from_value(&body).expect("object body")
}

fn abc123(watermark: bool) -> JobRequest {
    request(json!({
        "job_id": "abc123",
        "pet_type": "cat",
        "image_keys": ["in/a.jpg"],
        "watermark": watermark,
        "callback_url": "http://x/cb"
    }))
}

#[tokio::test]
async fn test_successful_job_uploads_result_and_calls_back() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", png_bytes(64, 48, [20, 120, 200]));

    let outcome = harness.orchestrator.run(abc123(true)).await;

    assert_eq!(outcome.job_id.as_deref(), Some("abc123"));
    assert_eq!(
        outcome.result,
        JobResult::Succeeded {
            result_key: "results/abc123.jpg".to_string()
        }
    );

    let uploaded = harness.store.get("results/abc123.jpg").expect("result uploaded");
    assert_eq!(image::guess_format(&uploaded).unwrap(), image::ImageFormat::Jpeg);
    let decoded = image::load_from_memory(&uploaded).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));

    let calls = harness.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "http://x/cb");
    assert_eq!(
        calls[0].1,
        CallbackPayload {
            job_id: "abc123".to_string(),
            success: true,
            result_key: Some("results/abc123.jpg".to_string()),
            error: None,
        }
    );
}

#[tokio::test]
async fn test_guardrail_rejection_skips_upload() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", png_bytes(32, 32, PERSON_MARKER));

    let outcome = harness.orchestrator.run(abc123(true)).await;

    match &outcome.result {
        JobResult::Failed { error } => {
            assert_eq!(error, PEOPLE_DETECTED);
            assert!(error.contains("people"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(harness.store.upload_count(), 0);

    let calls = harness.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.job_id, "abc123");
    assert!(!calls[0].1.success);
    assert_eq!(calls[0].1.error.as_deref(), Some(PEOPLE_DETECTED));
    assert!(calls[0].1.result_key.is_none());
}

#[tokio::test]
async fn test_guardrail_stops_at_first_flagged_image() {
    let harness = Harness::new();
    harness.store.put("in/a.png", png_bytes(8, 8, [0, 0, 0]));
    harness.store.put("in/b.png", png_bytes(8, 8, PERSON_MARKER));
    harness.store.put("in/c.png", png_bytes(8, 8, [0, 0, 0]));

    let outcome = harness
        .orchestrator
        .run(request(json!({
            "job_id": "ordered",
            "pet_type": "dog",
            "image_keys": ["in/a.png", "in/b.png", "in/c.png"],
            "callback_url": "http://x/cb"
        })))
        .await;

    assert!(!outcome.result.is_success());
    // All inputs are downloaded first, but checking stops at the flagged one.
    assert_eq!(harness.store.fetch_count(), 3);
    assert_eq!(harness.detector.check_count(), 2);
}

#[tokio::test]
async fn test_resubmission_overwrites_same_key() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", png_bytes(16, 16, [10, 10, 10]));

    let first = harness.orchestrator.run(abc123(false)).await;
    let second = harness.orchestrator.run(abc123(false)).await;

    assert!(first.result.is_success());
    assert_eq!(first.result, second.result);

    let uploads = harness.store.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|(key, _)| key == "results/abc123.jpg"));
    assert_eq!(
        harness.store.keys(),
        vec!["in/a.jpg".to_string(), "results/abc123.jpg".to_string()]
    );
    assert_eq!(harness.notifier.calls().len(), 2);
}

#[tokio::test]
async fn test_callback_failure_does_not_change_outcome() {
    let harness = Harness::with_notifier(RecordingNotifier::failing());
    harness.store.put("in/a.jpg", png_bytes(16, 16, [10, 10, 10]));

    let outcome = harness.orchestrator.run(abc123(true)).await;

    assert!(outcome.result.is_success());
    // Exactly one attempt, never retried
    assert_eq!(harness.notifier.calls().len(), 1);
}

#[tokio::test]
async fn test_watermark_changes_output_bytes() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", png_bytes(200, 200, [240, 240, 240]));

    harness.orchestrator.run(abc123(false)).await;
    let plain = harness.store.get("results/abc123.jpg").unwrap();

    harness.orchestrator.run(abc123(true)).await;
    let marked = harness.store.get("results/abc123.jpg").unwrap();

    assert_ne!(plain, marked);
}

#[tokio::test]
async fn test_missing_image_keys_makes_no_storage_calls() {
    let harness = Harness::new();

    let outcome = harness
        .orchestrator
        .run(request(json!({
            "job_id": "abc123",
            "pet_type": "cat",
            "callback_url": "http://x/cb"
        })))
        .await;

    match &outcome.result {
        JobResult::Failed { error } => assert!(error.contains("image_keys")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(harness.store.fetch_count(), 0);
    assert_eq!(harness.store.upload_count(), 0);

    let calls = harness.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].1.success);
}

#[tokio::test]
async fn test_missing_job_id_sends_no_callback() {
    let harness = Harness::new();

    let outcome = harness
        .orchestrator
        .run(request(json!({
            "pet_type": "cat",
            "image_keys": ["in/a.jpg"],
            "callback_url": "http://x/cb"
        })))
        .await;

    assert!(outcome.job_id.is_none());
    assert!(!outcome.result.is_success());
    assert!(harness.notifier.calls().is_empty());
    assert_eq!(harness.store.fetch_count(), 0);
}

#[tokio::test]
async fn test_download_failure_aborts_before_guardrail() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", png_bytes(8, 8, [0, 0, 0]));

    let outcome = harness
        .orchestrator
        .run(request(json!({
            "job_id": "missing-input",
            "pet_type": "cat",
            "image_keys": ["in/a.jpg", "in/gone.jpg"],
            "callback_url": "http://x/cb"
        })))
        .await;

    match &outcome.result {
        JobResult::Failed { error } => assert!(error.contains("in/gone.jpg")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(harness.detector.check_count(), 0);
    assert_eq!(harness.store.upload_count(), 0);
    assert_eq!(harness.notifier.calls().len(), 1);
}

#[tokio::test]
async fn test_undecodable_input_fails_job() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", b"not an image".to_vec());

    let outcome = harness.orchestrator.run(abc123(true)).await;

    assert!(!outcome.result.is_success());
    assert_eq!(harness.detector.check_count(), 0);
    assert_eq!(harness.store.upload_count(), 0);
}

#[tokio::test]
async fn test_generation_failure_is_reported() {
    let stages = Stages {
        generator: Arc::new(BrokenGenerator),
        ..Stages::passthrough()
    };
    let harness = Harness::with_stages(stages, 1);
    harness.store.put("in/a.jpg", png_bytes(8, 8, [0, 0, 0]));

    let outcome = harness.orchestrator.run(abc123(true)).await;

    match &outcome.result {
        JobResult::Failed { error } => assert!(error.contains("model crashed")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(harness.store.upload_count(), 0);
    let calls = harness.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.error.as_deref(), outcome_error(&outcome.result));
}

fn outcome_error(result: &JobResult) -> Option<&str> {
    match result {
        JobResult::Failed { error } => Some(error.as_str()),
        JobResult::Succeeded { .. } => None,
    }
}

fn is_empty_or_missing(dir: &std::path::Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[tokio::test]
async fn test_scratch_files_removed_after_job() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", png_bytes(8, 8, [0, 0, 0]));

    let outcome = harness.orchestrator.run(abc123(true)).await;

    assert!(outcome.result.is_success());
    assert!(is_empty_or_missing(&harness.root.join("downloads")));
    assert!(is_empty_or_missing(&harness.root.join("outputs")));
}

#[tokio::test]
async fn test_inputs_sharing_a_file_name_are_all_checked() {
    let harness = Harness::new();
    harness.store.put("a/pet.png", png_bytes(8, 8, PERSON_MARKER));
    harness.store.put("b/pet.png", png_bytes(8, 8, [0, 0, 0]));

    let outcome = harness
        .orchestrator
        .run(request(json!({
            "job_id": "same-name",
            "pet_type": "cat",
            "image_keys": ["a/pet.png", "b/pet.png"],
            "callback_url": "http://x/cb"
        })))
        .await;

    assert_eq!(outcome_error(&outcome.result), Some(PEOPLE_DETECTED));
    assert_eq!(harness.detector.check_count(), 1);
    assert_eq!(harness.store.upload_count(), 0);
    assert_eq!(harness.notifier.calls().len(), 1);
}

#[tokio::test]
async fn test_guardrail_error_fails_closed() {
    let stages = Stages {
        detector: Arc::new(UnreachableDetector),
        ..Stages::passthrough()
    };
    let harness = Harness::with_stages(stages, 1);
    harness.store.put("in/a.jpg", png_bytes(8, 8, [0, 0, 0]));

    let outcome = harness.orchestrator.run(abc123(true)).await;

    match &outcome.result {
        JobResult::Failed { error } => assert!(error.contains("detector offline")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(harness.store.upload_count(), 0);
    let calls = harness.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].1.success);
    assert!(calls[0].1.result_key.is_none());
}

#[tokio::test]
async fn test_job_ids_with_same_safe_name_stay_isolated() {
    let harness = Harness::with_stages(Stages::passthrough(), 2);
    harness.store.put("in/green.png", png_bytes(32, 32, [0, 200, 0]));
    harness.store.put("in/blue.png", png_bytes(32, 32, [0, 0, 200]));

    let job = |id: &str, key: &str| {
        request(json!({
            "job_id": id,
            "pet_type": "dog",
            "image_keys": [key],
            "watermark": false,
            "callback_url": "http://x/cb"
        }))
    };

    let (slash, underscore) = tokio::join!(
        harness.orchestrator.run(job("a/b", "in/green.png")),
        harness.orchestrator.run(job("a_b", "in/blue.png")),
    );
    assert!(slash.result.is_success());
    assert!(underscore.result.is_success());

    let pixel = |key: &str| {
        let bytes = harness.store.get(key).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgb8().get_pixel(16, 16).0
    };
    let g = pixel("results/a/b.jpg");
    let b = pixel("results/a_b.jpg");
    assert!(g[1] > 150 && g[2] < 50, "a/b result was {:?}", g);
    assert!(b[2] > 150 && b[1] < 50, "a_b result was {:?}", b);
}

#[tokio::test]
async fn test_jobs_after_shutdown_are_unavailable() {
    let harness = Harness::new();
    harness.store.put("in/a.jpg", png_bytes(8, 8, [0, 0, 0]));
    harness.orchestrator.shutdown();

    let outcome = harness.orchestrator.run(abc123(true)).await;

    assert_eq!(outcome_error(&outcome.result), Some("Worker is shutting down"));
    assert_eq!(harness.store.fetch_count(), 0);
    let calls = harness.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].1.success);
}

#[tokio::test]
async fn test_non_http_callback_url_is_not_called() {
    let harness = Harness::new();

    let outcome = harness
        .orchestrator
        .run(request(json!({
            "job_id": "abc123",
            "pet_type": "cat",
            "image_keys": ["in/a.jpg"],
            "callback_url": "/internal/worker-callback"
        })))
        .await;

    assert!(!outcome.result.is_success());
    assert_eq!(outcome.job_id.as_deref(), Some("abc123"));
    assert!(harness.notifier.calls().is_empty());
    assert_eq!(harness.store.fetch_count(), 0);
}

#[tokio::test]
async fn test_concurrent_jobs_sharing_input_basename() {
    let harness = Harness::with_stages(Stages::passthrough(), 2);
    harness.store.put("user1/pet.png", png_bytes(32, 32, [0, 200, 0]));
    harness.store.put("user2/pet.png", png_bytes(32, 32, [0, 0, 200]));

    let job = |id: &str, key: &str| {
        request(json!({
            "job_id": id,
            "pet_type": "cat",
            "image_keys": [key],
            "watermark": false,
            "callback_url": "http://x/cb"
        }))
    };

    let (green, blue) = tokio::join!(
        harness.orchestrator.run(job("green", "user1/pet.png")),
        harness.orchestrator.run(job("blue", "user2/pet.png")),
    );
    assert!(green.result.is_success());
    assert!(blue.result.is_success());

    let pixel = |key: &str| {
        let bytes = harness.store.get(key).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgb8().get_pixel(16, 16).0
    };
    let g = pixel("results/green.jpg");
    let b = pixel("results/blue.jpg");
    assert!(g[1] > 150 && g[2] < 50, "green result was {:?}", g);
    assert!(b[2] > 150 && b[1] < 50, "blue result was {:?}", b);
}

#[tokio::test]
async fn test_job_pool_bounds_concurrency() {
    let generator = Arc::new(SlowGenerator::default());
    let stages = Stages {
        generator: generator.clone(),
        ..Stages::passthrough()
    };
    let harness = Harness::with_stages(stages, 1);
    for i in 0..3 {
        harness.store.put(&format!("in/{}.png", i), png_bytes(8, 8, [0, 0, 0]));
    }

    let jobs = (0..3).map(|i| {
        harness.orchestrator.run(request(json!({
            "job_id": format!("job-{}", i),
            "pet_type": "dog",
            "image_keys": [format!("in/{}.png", i)],
            "callback_url": "http://x/cb"
        })))
    });
    let outcomes = futures::future::join_all(jobs).await;

    assert!(outcomes.iter().all(|o| o.result.is_success()));
    assert_eq!(generator.peak.load(Ordering::SeqCst), 1);
    assert_eq!(harness.notifier.calls().len(), 3);
}

//! End-to-end tests for the detection API, run against the real router
//! with a stub detector so no external process is involved.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tower::ServiceExt;

use piddetect_server::cache::ResultCache;
use piddetect_server::config::Config;
use piddetect_server::inference::{Detector, InferenceError};
use piddetect_server::models::{BoundingBox, DetectionSettings, InferenceOutput, RawDetection};
use piddetect_server::{create_router, AppState};

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

#[derive(Clone)]
enum StubBehavior {
    /// Succeed with N detections and no reported id.
    Detections(usize),
    /// Succeed with one detection and a payload-reported id.
    WithId(String),
    /// Non-zero exit with this stderr text.
    ExitFailure(String),
    /// Zero exit, unparsable stdout.
    Garbage,
}

#[derive(Clone)]
struct StubDetector {
    behavior: StubBehavior,
    calls: Arc<AtomicUsize>,
    seen_settings: Arc<Mutex<Option<DetectionSettings>>>,
}

impl StubDetector {
    fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_settings: Arc::new(Mutex::new(None)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for StubDetector {
    async fn run(
        &self,
        image: &Path,
        settings: &DetectionSettings,
    ) -> Result<InferenceOutput, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_settings.lock() = Some(*settings);
        assert!(image.exists(), "upload must be persisted before inference");

        let detection = |i: usize| RawDetection {
            class: format!("symbol-{i}"),
            confidence: 0.9,
            bbox: BoundingBox {
                x: i as f32 * 10.0,
                y: 5.0,
                width: 20.0,
                height: 15.0,
            },
        };

        match &self.behavior {
            StubBehavior::Detections(n) => Ok(InferenceOutput {
                id: None,
                original_image: "orig-b64".into(),
                processed_image: "annotated-b64".into(),
                detections: (0..*n).map(detection).collect(),
            }),
            StubBehavior::WithId(id) => Ok(InferenceOutput {
                id: Some(id.clone()),
                original_image: "orig-b64".into(),
                processed_image: "annotated-b64".into(),
                detections: vec![detection(0)],
            }),
            StubBehavior::ExitFailure(stderr) => Err(InferenceError::ProcessFailed {
                code: Some(1),
                stderr: stderr.clone(),
            }),
            StubBehavior::Garbage => Err(InferenceError::MalformedOutput(
                "expected value at line 1 column 1".into(),
            )),
        }
    }
}

struct TestServer {
    app: Router,
    cache: ResultCache,
    stub: StubDetector,
    _uploads: tempfile::TempDir,
}

fn test_server_with_limit(behavior: StubBehavior, max_upload_bytes: usize) -> TestServer {
    let uploads = tempfile::tempdir().unwrap();
    let config = Config {
        port: 0,
        uploads_dir: uploads.path().join("uploads"),
        results_dir: uploads.path().join("results"),
        interpreter: "python3".into(),
        script_path: "scripts/detect.py".into(),
        max_upload_bytes,
        inference_timeout_secs: 5,
        environment: "test".into(),
    };

    let stub = StubDetector::new(behavior);
    let state = AppState::new(config, stub.clone());
    let cache = state.cache.clone();

    TestServer {
        app: create_router(state),
        cache,
        stub,
        _uploads: uploads,
    }
}

fn test_server(behavior: StubBehavior) -> TestServer {
    test_server_with_limit(behavior, 10 * 1024 * 1024)
}

struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    fn new() -> Self {
        Self { body: Vec::new() }
    }

    fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n")
                .as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn into_request(mut self) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/api/detect")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn png_upload(data: &[u8]) -> MultipartForm {
    MultipartForm::new().file("image", "diagram.png", "image/png", data)
}

#[tokio::test]
async fn test_detect_returns_processed_image() {
    let server = test_server(StubBehavior::Detections(3));

    let request = png_upload(&vec![0u8; 500 * 1024])
        .text("confidenceThreshold", "0.5")
        .text("iouThreshold", "0.45")
        .into_request();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 3);
    assert_eq!(json["processedImage"], "annotated-b64");
    assert_eq!(json["originalImage"], "orig-b64");

    let ids: HashSet<&str> = detections
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 3, "detection ids must be unique");

    for d in detections {
        let confidence = d["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }

    assert_eq!(server.stub.calls(), 1);
    assert_eq!(server.cache.len(), 1);
}

#[tokio::test]
async fn test_detect_then_lookup_roundtrip() {
    let server = test_server(StubBehavior::Detections(2));

    let response = server
        .app
        .clone()
        .oneshot(png_upload(b"fake png").into_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detect_json = body_json(response).await;
    let id = detect_json["id"].as_str().unwrap().to_string();

    let lookup = |id: String| {
        let app = server.app.clone();
        async move {
            let request = Request::builder()
                .uri(format!("/api/results/{id}"))
                .body(Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            body_json(response).await
        }
    };

    let first = lookup(id.clone()).await;
    assert_eq!(first, detect_json);

    // Lookup is idempotent: the same id always yields identical data.
    let second = lookup(id).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_detect_uses_invoker_reported_id() {
    let server = test_server(StubBehavior::WithId("model-chose-this".into()));

    let response = server
        .app
        .clone()
        .oneshot(png_upload(b"fake png").into_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["id"], "model-chose-this");
    assert!(server.cache.get("model-chose-this").is_some());
}

#[tokio::test]
async fn test_missing_file_is_rejected() {
    let server = test_server(StubBehavior::Detections(1));

    let request = MultipartForm::new()
        .text("confidenceThreshold", "0.5")
        .into_request();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["message"], "No file uploaded");
    assert_eq!(server.stub.calls(), 0);
    assert!(server.cache.is_empty());
}

#[tokio::test]
async fn test_disallowed_mime_type_never_reaches_invoker() {
    let server = test_server(StubBehavior::Detections(1));

    // A text file renamed .jpg still declares text/plain.
    let request = MultipartForm::new()
        .file("image", "notes.jpg", "text/plain", b"not an image")
        .into_request();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("Invalid file type"));
    assert_eq!(server.stub.calls(), 0);
    assert!(server.cache.is_empty());
}

#[tokio::test]
async fn test_upload_size_boundary() {
    let limit = 64 * 1024;

    // Exactly at the limit passes validation.
    let server = test_server_with_limit(StubBehavior::Detections(1), limit);
    let response = server
        .app
        .clone()
        .oneshot(png_upload(&vec![0u8; limit]).into_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // One byte over is a client error with no cache write.
    let server = test_server_with_limit(StubBehavior::Detections(1), limit);
    let response = server
        .app
        .clone()
        .oneshot(png_upload(&vec![0u8; limit + 1]).into_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.stub.calls(), 0);
    assert!(server.cache.is_empty());
}

#[tokio::test]
async fn test_non_numeric_thresholds_are_rejected() {
    let server = test_server(StubBehavior::Detections(1));

    let request = png_upload(b"fake png")
        .text("confidenceThreshold", "very confident")
        .into_request();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["message"], "Invalid threshold values");
    assert_eq!(server.stub.calls(), 0);
    assert!(server.cache.is_empty());
}

#[tokio::test]
async fn test_out_of_range_thresholds_are_clamped() {
    let server = test_server(StubBehavior::Detections(1));

    let request = png_upload(b"fake png")
        .text("confidenceThreshold", "0.01")
        .text("iouThreshold", "5")
        .into_request();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen = server.stub.seen_settings.lock().expect("detector was invoked");
    assert_eq!(seen.confidence_threshold, 0.1);
    assert_eq!(seen.iou_threshold, 0.9);
}

#[tokio::test]
async fn test_process_failure_surfaces_stderr_and_writes_nothing() {
    let server = test_server(StubBehavior::ExitFailure("model load failed".into()));

    let response = server
        .app
        .clone()
        .oneshot(png_upload(b"fake png").into_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("model load failed"));
    assert!(server.cache.is_empty());
}

#[tokio::test]
async fn test_malformed_output_is_a_distinct_server_error() {
    let server = test_server(StubBehavior::Garbage);

    let response = server
        .app
        .clone()
        .oneshot(png_upload(b"fake png").into_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    let message = json["message"].as_str().unwrap();
    assert!(message.contains("parse"));
    assert!(!message.contains("Detection failed:"));
    assert!(server.cache.is_empty());
}

#[tokio::test]
async fn test_unknown_result_id_is_not_found() {
    let server = test_server(StubBehavior::Detections(1));

    let request = Request::builder()
        .uri("/api/results/unknown-id")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["message"], "Result not found");
}

#[tokio::test]
async fn test_failed_detection_leaves_no_retrievable_result() {
    let server = test_server(StubBehavior::ExitFailure("weights missing".into()));

    let response = server
        .app
        .clone()
        .oneshot(png_upload(b"fake png").into_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Nothing from the failed attempt can be looked up afterwards.
    assert!(server.cache.is_empty());
    let request = Request::builder()
        .uri("/api/results/anything")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = test_server(StubBehavior::Detections(0));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

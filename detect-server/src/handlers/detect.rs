//! Detection request handler
//!
//! Drives the full upload pipeline: validate the multipart request,
//! persist the image to a temp path, run the detector, assemble and
//! cache the processed result. Every failure before the detector call
//! is a 400 with zero side effects; detector failures are 500 and leave
//! no cache entry behind.

use std::path::{Path, PathBuf};

use axum::extract::{Multipart, State};
use axum::Json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::inference::Detector;
use crate::models::{DetectionResult, DetectionSettings, ProcessedImage};
use crate::AppState;

const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

struct UploadField {
    file_name: String,
    content_type: String,
    data: axum::body::Bytes,
}

/// Removes the uploaded temp file when the request path unwinds, on
/// success and failure alike.
struct ScopedUpload {
    path: PathBuf,
}

impl ScopedUpload {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove uploaded temp file");
            }
        }
    }
}

/// POST /api/detect - upload a P&ID image and run symbol detection
pub async fn detect<D: Detector>(
    State(state): State<AppState<D>>,
    mut multipart: Multipart,
) -> AppResult<Json<ProcessedImage>> {
    let mut upload: Option<UploadField> = None;
    let mut confidence_raw: Option<String> = None;
    let mut iou_raw: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Malformed multipart request: {e}")))?
    {
        match field.name() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| {
                    AppError::ValidationError(format!("Failed to read uploaded file: {e}"))
                })?;
                upload = Some(UploadField {
                    file_name,
                    content_type,
                    data,
                });
            }
            Some("confidenceThreshold") => {
                confidence_raw = Some(field.text().await.map_err(|e| {
                    AppError::ValidationError(format!("Failed to read form field: {e}"))
                })?);
            }
            Some("iouThreshold") => {
                iou_raw = Some(field.text().await.map_err(|e| {
                    AppError::ValidationError(format!("Failed to read form field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let upload =
        upload.ok_or_else(|| AppError::ValidationError("No file uploaded".to_string()))?;

    if !ALLOWED_MIME_TYPES.contains(&upload.content_type.as_str()) {
        return Err(AppError::ValidationError(
            "Invalid file type. Only JPEG, PNG and GIF files are allowed.".to_string(),
        ));
    }

    if upload.data.len() > state.config.max_upload_bytes {
        return Err(AppError::ValidationError(format!(
            "File too large. Maximum size is {} bytes.",
            state.config.max_upload_bytes
        )));
    }

    let settings = parse_settings(confidence_raw.as_deref(), iou_raw.as_deref())?;

    tokio::fs::create_dir_all(&state.config.uploads_dir)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to create uploads dir: {e}")))?;

    let upload_path = state.config.uploads_dir.join(format!(
        "{}-{}",
        Uuid::new_v4(),
        sanitize_file_name(&upload.file_name)
    ));
    tokio::fs::write(&upload_path, &upload.data)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to persist upload: {e}")))?;
    let scoped = ScopedUpload { path: upload_path };

    let output = state.detector.run(scoped.path(), &settings).await?;

    let detections: Vec<DetectionResult> = output
        .detections
        .into_iter()
        .map(|d| DetectionResult {
            id: Uuid::new_v4().to_string(),
            class: d.class,
            confidence: d.confidence,
            bbox: d.bbox,
        })
        .collect();

    let result = ProcessedImage {
        id: output.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        original_image: output.original_image,
        processed_image: output.processed_image,
        detections,
    };

    tracing::info!(
        id = %result.id,
        detections = result.detections.len(),
        file = %upload.file_name,
        "detection complete"
    );

    Ok(Json(state.cache.put(result)))
}

/// Thresholds arrive as string-encoded floats. Non-numeric input is a
/// client error; numeric values outside the documented range are
/// clamped into [0.1, 0.9] to match the declared schema.
fn parse_settings(
    confidence_raw: Option<&str>,
    iou_raw: Option<&str>,
) -> AppResult<DetectionSettings> {
    let confidence_threshold = confidence_raw
        .unwrap_or("0.5")
        .trim()
        .parse::<f32>()
        .map_err(|_| AppError::ValidationError("Invalid threshold values".to_string()))?;
    let iou_threshold = iou_raw
        .unwrap_or("0.45")
        .trim()
        .parse::<f32>()
        .map_err(|_| AppError::ValidationError("Invalid threshold values".to_string()))?;

    if !confidence_threshold.is_finite() || !iou_threshold.is_finite() {
        return Err(AppError::ValidationError(
            "Invalid threshold values".to_string(),
        ));
    }

    Ok(DetectionSettings {
        confidence_threshold,
        iou_threshold,
    }
    .clamped())
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

//! Detection model

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in image pixel coordinates, top-left origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One labeled, localized object found in an image by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub id: String,
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Full record for one processed upload. Immutable once built; `id` is
/// the cache key and the lookup handle handed back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    pub id: String,
    pub original_image: String,
    pub processed_image: String,
    pub detections: Vec<DetectionResult>,
}

/// Per-request detection thresholds. Both values live in [0.1, 0.9];
/// `clamped` is applied before anything reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

pub const MIN_THRESHOLD: f32 = 0.1;
pub const MAX_THRESHOLD: f32 = 0.9;

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        }
    }
}

impl DetectionSettings {
    pub fn clamped(self) -> Self {
        Self {
            confidence_threshold: self.confidence_threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD),
            iou_threshold: self.iou_threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD),
        }
    }
}

/// Payload the detection process emits on stdout. Detections arrive
/// without ids; the handler assigns fresh ones when it builds the
/// [`ProcessedImage`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceOutput {
    #[serde(default)]
    pub id: Option<String>,
    pub original_image: String,
    pub processed_image: String,
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDetection {
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

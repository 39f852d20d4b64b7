//! Detection API Client
//!
//! HTTP client for communicating with the detection server. The wire
//! types mirror the server's models; the two crates deliberately share
//! no code, only the JSON contract.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse server response: {0}")]
    Parse(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Cannot read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported image type: {0}")]
    UnsupportedImage(String),
}

// Wire types

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub id: String,
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    pub id: String,
    pub original_image: String,
    pub processed_image: String,
    pub detections: Vec<DetectionResult>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Detection API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl ApiClient {
    /// Create new API client
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Check server health
    pub async fn health_check(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/health", self.config.server_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()))
        } else {
            Err(ClientError::Server {
                status: response.status().as_u16(),
                message: "health check failed".to_string(),
            })
        }
    }

    /// Upload an image and run symbol detection on it
    pub async fn detect(
        &self,
        image: &Path,
        settings: &DetectionSettings,
    ) -> Result<ProcessedImage, ClientError> {
        let url = format!("{}/api/detect", self.config.server_url);

        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_for(&file_name)?;
        let data = tokio::fs::read(image).await?;

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text(
                "confidenceThreshold",
                settings.confidence_threshold.to_string(),
            )
            .text("iouThreshold", settings.iou_threshold.to_string());

        tracing::info!(image = %image.display(), "uploading image for detection");

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Self::read_json(response).await
    }

    /// Fetch a previously processed result by id
    pub async fn result(&self, id: &str) -> Result<ProcessedImage, ClientError> {
        let url = format!("{}/api/results/{}", self.config.server_url, id);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Self::read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()));
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => format!("request failed with status {status}"),
        };

        if status.is_client_error() {
            Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(ClientError::Server {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn mime_for(file_name: &str) -> Result<&'static str, ClientError> {
    let extension = file_name.rsplit('.').next().unwrap_or_default();
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "gif" => Ok("image/gif"),
        other => Err(ClientError::UnsupportedImage(other.to_string())),
    }
}

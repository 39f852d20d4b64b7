//! Inference invoker
//!
//! Wraps the external detection process behind the [`Detector`] trait.
//! The model is an opaque collaborator: it takes an image path, an
//! output path and two thresholds on the command line, writes the
//! annotated image to the output path, and emits one JSON payload on
//! stdout. Everything past that boundary is its business.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::models::{DetectionSettings, InferenceOutput};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Input file does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Detection script not found at: {}", .0.display())]
    MissingScript(PathBuf),

    #[error("Failed to launch detection process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Detection failed: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("Failed to parse detection results: {0}")]
    MalformedOutput(String),

    #[error("Detection timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Capability boundary for running detection on one image. Handlers are
/// generic over this so the request pipeline never cares whether the
/// implementation shells out, calls a library, or is a test stub.
pub trait Detector: Send + Sync + 'static {
    fn run(
        &self,
        image: &Path,
        settings: &DetectionSettings,
    ) -> impl std::future::Future<Output = Result<InferenceOutput, InferenceError>> + Send;
}

/// Production detector: one external process per call.
#[derive(Debug, Clone)]
pub struct ScriptDetector {
    interpreter: PathBuf,
    script: PathBuf,
    results_dir: PathBuf,
    timeout: Duration,
}

impl ScriptDetector {
    pub fn new(
        interpreter: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            results_dir: results_dir.into(),
            timeout,
        }
    }

    async fn invoke(
        &self,
        image: &Path,
        output_path: &Path,
        settings: &DetectionSettings,
    ) -> Result<InferenceOutput, InferenceError> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.script)
            .arg("--image")
            .arg(image)
            .arg("--output")
            .arg(output_path)
            .arg("--conf")
            .arg(settings.confidence_threshold.to_string())
            .arg("--iou")
            .arg(settings.iou_threshold.to_string())
            .kill_on_drop(true);

        tracing::debug!(
            image = %image.display(),
            conf = settings.confidence_threshold,
            iou = settings.iou_threshold,
            "spawning detection process"
        );

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| InferenceError::TimedOut(self.timeout))?;
        let output = result?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(
                code = ?output.status.code(),
                stderr = %stderr,
                "detection process exited with failure"
            );
            return Err(InferenceError::ProcessFailed {
                code: output.status.code(),
                stderr,
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            tracing::error!(
                error = %e,
                stdout_len = output.stdout.len(),
                "detection process output did not parse"
            );
            InferenceError::MalformedOutput(e.to_string())
        })
    }
}

impl Detector for ScriptDetector {
    async fn run(
        &self,
        image: &Path,
        settings: &DetectionSettings,
    ) -> Result<InferenceOutput, InferenceError> {
        if !image.exists() {
            return Err(InferenceError::MissingInput(image.to_path_buf()));
        }
        if !self.script.exists() {
            return Err(InferenceError::MissingScript(self.script.clone()));
        }

        tokio::fs::create_dir_all(&self.results_dir).await?;
        let output_path = self
            .results_dir
            .join(format!("result-{}.jpg", uuid::Uuid::new_v4()));

        let result = self.invoke(image, &output_path, settings).await;

        // The payload carries the annotated image content; the file the
        // process wrote is transient and reclaimed here on every path.
        if let Err(e) = tokio::fs::remove_file(&output_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %output_path.display(), error = %e, "failed to remove result artifact");
            }
        }

        result
    }
}

//! Configuration module

use std::env;
use std::path::PathBuf;

/// Hard cap on uploaded image size.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Where uploaded images are persisted before inference
    pub uploads_dir: PathBuf,

    /// Where the detection process writes annotated images
    pub results_dir: PathBuf,

    /// Interpreter used to launch the detection script
    pub interpreter: PathBuf,

    /// Path to the detection script
    pub script_path: PathBuf,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,

    /// Wall-clock limit for one inference call, in seconds
    pub inference_timeout_secs: u64,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            uploads_dir: env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),

            results_dir: env::var("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("results")),

            interpreter: env::var("DETECT_INTERPRETER")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("python3")),

            script_path: env::var("DETECT_SCRIPT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("scripts/detect.py")),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),

            inference_timeout_secs: env::var("INFERENCE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),

            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

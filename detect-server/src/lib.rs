//! P&ID Symbol Detection API Server
//!
//! Accepts an uploaded piping-and-instrumentation diagram, hands it to
//! an external detection process, and serves the annotated result back
//! from an in-memory cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 PIDDETECT SERVER                         │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────┐   ┌────────────────┐  │
//! │  │  API      │   │  Inference   │   │  Result Cache  │  │
//! │  │  Gateway  │──▶│  Invoker     │──▶│  (in-memory)   │  │
//! │  │  (Axum)   │   │  (subprocess)│   │                │  │
//! │  └───────────┘   └──────┬───────┘   └────────────────┘  │
//! │                         ▼                                │
//! │                  ┌─────────────┐                        │
//! │                  │  detect.py  │                        │
//! │                  └─────────────┘                        │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inference;
pub mod models;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};

use cache::ResultCache;
use config::Config;
use inference::Detector;

// Multipart framing adds headers and boundaries on top of the file body.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state
pub struct AppState<D> {
    pub cache: ResultCache,
    pub config: Arc<Config>,
    pub detector: Arc<D>,
}

// Manual impl: a derived Clone would demand D: Clone, which stubs and
// the production detector alike should not need behind an Arc.
impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            config: self.config.clone(),
            detector: self.detector.clone(),
        }
    }
}

impl<D: Detector> AppState<D> {
    pub fn new(config: Config, detector: D) -> Self {
        Self {
            cache: ResultCache::new(),
            config: Arc::new(config),
            detector: Arc::new(detector),
        }
    }
}

/// Create the main router with all routes
pub fn create_router<D: Detector>(state: AppState<D>) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/detect", post(handlers::detect::detect::<D>))
        .route("/api/results/:id", get(handlers::results::get::<D>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

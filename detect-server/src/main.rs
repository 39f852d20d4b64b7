use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use piddetect_server::config::Config;
use piddetect_server::inference::ScriptDetector;
use piddetect_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "piddetect_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("P&ID detection server starting...");
    tracing::info!("Detection script: {}", config.script_path.display());

    // Working directories for uploads and annotated results
    std::fs::create_dir_all(&config.uploads_dir)
        .with_context(|| format!("failed to create {}", config.uploads_dir.display()))?;
    std::fs::create_dir_all(&config.results_dir)
        .with_context(|| format!("failed to create {}", config.results_dir.display()))?;

    let detector = ScriptDetector::new(
        &config.interpreter,
        &config.script_path,
        &config.results_dir,
        Duration::from_secs(config.inference_timeout_secs),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, detector);
    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

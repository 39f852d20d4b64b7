use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use piddetect_client::{ApiClient, ClientConfig, DetectionSession, ProcessedImage, SessionState};

#[derive(Parser)]
#[command(name = "piddetect", about = "P&ID symbol detection client", version)]
struct Cli {
    /// Detection server base URL
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload an image and run symbol detection
    Detect {
        /// Path to the P&ID image (jpeg, png or gif)
        image: PathBuf,

        /// Minimum model confidence for a detection to be reported
        #[arg(long, default_value_t = 0.5)]
        confidence: f32,

        /// IoU cutoff for suppressing overlapping duplicates
        #[arg(long, default_value_t = 0.45)]
        iou: f32,

        /// Print the raw JSON response instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Fetch a previously processed result by id
    Result {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "piddetect_client=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(ClientConfig {
        server_url: cli.server.clone(),
        ..ClientConfig::default()
    })?;

    match cli.command {
        Command::Detect {
            image,
            confidence,
            iou,
            json,
        } => {
            let mut session = DetectionSession::new(client);
            session.update_settings(confidence, iou);

            match session.submit(&image).await {
                Ok(result) => print_result(&result, json)?,
                Err(e) => {
                    if let SessionState::Error(message) = session.state() {
                        tracing::error!("detection failed: {message}");
                    }
                    return Err(e.into());
                }
            }
        }
        Command::Result { id, json } => {
            let result = client.result(&id).await?;
            print_result(&result, json)?;
        }
        Command::Health => {
            let health = client.health_check().await?;
            println!("{} (v{})", health.status, health.version);
        }
    }

    Ok(())
}

fn print_result(result: &ProcessedImage, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("result id: {}", result.id);
    println!("detections: {}", result.detections.len());
    for d in &result.detections {
        println!(
            "  {:<24} {:>5.1}%  at ({:.0}, {:.0}) {}x{}",
            d.class,
            d.confidence * 100.0,
            d.bbox.x,
            d.bbox.y,
            d.bbox.width as i64,
            d.bbox.height as i64,
        );
    }

    Ok(())
}

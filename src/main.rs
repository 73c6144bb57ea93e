//! Background Removal API service binary.
//!
//! Accepts an uploaded image over HTTP, removes its background through the
//! matting session, and returns the result as raw PNG bytes or a base64
//! JSON envelope. Startup sequence: logging, configuration (file, then
//! environment overrides, then validation), metrics, listener, server.

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bg_removal_api::config::{apply_env_overrides, load_config, validate_config, ConfigError};
use bg_removal_api::transform::ChromaMatteSession;
use bg_removal_api::{HttpServer, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "bg-removal-api", about = "Background removal HTTP service")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bg_removal_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("bg-removal-api v{} starting", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_file_size = config.upload.max_file_size,
        request_limit = config.rate_limit.max_requests,
        time_window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => bg_removal_api::observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let server = HttpServer::new(config, Box::new(ChromaMatteSession::default()));
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

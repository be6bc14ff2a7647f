use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use noapi::config::{LogFormat, LoggingConfig, NoapiConfig};
use noapi::http::{AppState, HttpServer};
use noapi::ratelimit::RateLimiter;
use noapi::reasons::ReasonProvider;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "noapi", version, about = "Answers every request with a reason to say no")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on, overriding file and environment
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match args.config.as_deref() {
        Some(path) => NoapiConfig::from_file(path)?,
        None => NoapiConfig::default(),
    };

    init_tracing(&config.logging);

    config.apply_env();
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("Starting NoAPI service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        addr = %config.server.addr(),
        max_requests = config.rate_limiting.max_requests,
        window_secs = config.rate_limiting.window_secs,
        block_duration_secs = config.rate_limiting.block_duration_secs,
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiting.to_limiter_config()?));
    info!("Rate limiter initialized");

    let reasons = Arc::new(ReasonProvider::from_file(
        &config.reasons.path,
        config.reasons.sigh_probability,
    )?);

    let server = HttpServer::new(config.server.addr(), AppState::new(rate_limiter, reasons));

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("NoAPI service stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

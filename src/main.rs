//! Batch Scoring Service - Main Entry Point
//!
//! Watches the input directory for new CSV files and scores each one until
//! interrupted.

use anyhow::Result;
use batch_scoring_service::{config::AppConfig, logging::init_logging, ScoringService};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging (stdout + log file)
    init_logging(&config.logging, &config.paths.log_file)?;

    info!("Starting ML scoring service");
    info!(
        "Decision threshold: {:.2}, top features: {}, poll interval: {}ms",
        config.model.threshold, config.model.top_k, config.watcher.poll_interval_ms
    );

    let service = match ScoringService::bootstrap(config) {
        Ok(service) => service,
        Err(e) => {
            error!(error = ?e, "Service startup failed");
            return Err(e);
        }
    };

    service.run(shutdown_signal()).await?;

    info!("Service shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

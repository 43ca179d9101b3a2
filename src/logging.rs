//! Tracing setup: every event goes to stdout and to the service log file.

use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Failing to create
/// the log file is an error, since the service must not run without it.
pub fn init_logging(config: &LoggingConfig, log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
    let file = Arc::new(file);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let layers: Vec<BoxedLayer> = match config.format {
        LogFormat::Text => vec![
            tracing_subscriber::fmt::layer().with_target(true).boxed(),
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file)
                .boxed(),
        ],
        LogFormat::Json => vec![
            tracing_subscriber::fmt::layer().json().boxed(),
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(file)
                .boxed(),
        ],
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

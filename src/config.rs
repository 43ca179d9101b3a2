//! Configuration management for the batch scoring service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Probability cutoff above which a row is classified positive
pub const DEFAULT_THRESHOLD: f64 = 0.95;

/// Number of features written to the importance JSON
pub const DEFAULT_TOP_K: usize = 5;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "SCORING_CONFIG";

/// Log output format
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub model: ModelConfig,
    pub reference: ReferenceConfig,
    pub watcher: WatcherConfig,
    pub pipeline: PipelineConfig,
    pub plot: PlotConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Filesystem locations used at runtime
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory watched for new input files
    pub input_dir: PathBuf,
    /// Directory receiving the artifact triple of every processed file
    pub output_dir: PathBuf,
    /// Service log file (written alongside stdout)
    pub log_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/app/input"),
            output_dir: PathBuf::from("/app/output"),
            log_file: PathBuf::from("/app/logs/service.log"),
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Gzip-compressed ONNX model shipped with the service
    pub archive_path: PathBuf,
    /// Where the archive is decompressed to before loading
    pub model_path: PathBuf,
    /// Feature names and importances exported alongside the model
    pub metadata_path: PathBuf,
    /// Decision threshold, read once at startup
    pub threshold: f64,
    /// Number of top features saved per processed file
    pub top_k: usize,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::from("/app/models/model.onnx.gz"),
            model_path: PathBuf::from("/app/models/model.onnx"),
            metadata_path: PathBuf::from("/app/models/model_meta.json"),
            threshold: DEFAULT_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            onnx_threads: 1,
        }
    }
}

/// Reference training data configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// CSV the model was trained on
    pub train_data_path: PathBuf,
    /// Columns of the training data that are not model features
    pub exclude_columns: Vec<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            train_data_path: PathBuf::from("/app/train_data/train.csv"),
            exclude_columns: vec!["target".to_string()],
        }
    }
}

/// Directory watcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Delay between two directory scans in milliseconds
    pub poll_interval_ms: u64,
    /// File extension (without the dot) that triggers processing
    pub extension: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            extension: "csv".to_string(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fingerprints of processed files remembered to skip duplicate events (0 disables)
    pub dedup_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 1024,
        }
    }
}

/// Density plot configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub bins: usize,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            bins: 50,
            width: 600,
            height: 400,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between two summaries (0 disables the periodic report)
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file (or `SCORING_CONFIG`) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path; a missing file yields the defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("SCORING").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.model.threshold) {
            anyhow::bail!(
                "model.threshold must be within [0, 1], got {}",
                self.model.threshold
            );
        }
        if self.model.top_k == 0 {
            anyhow::bail!("model.top_k must be at least 1");
        }
        if self.plot.bins == 0 {
            anyhow::bail!("plot.bins must be at least 1");
        }
        if self.plot.width == 0 || self.plot.height == 0 {
            anyhow::bail!(
                "plot size must be non-zero, got {}x{}",
                self.plot.width,
                self.plot.height
            );
        }
        if self.watcher.extension.trim_start_matches('.').is_empty() {
            anyhow::bail!("watcher.extension must not be empty");
        }
        Ok(())
    }
}

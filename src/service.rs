//! Service supervisor: one-time startup, then watch until shutdown.
//!
//! Every startup step is fatal on failure. The watcher only starts once the
//! model, the reference schema and the output directory are all in place.

use crate::artifacts::ArtifactWriter;
use crate::config::AppConfig;
use crate::metrics::{MetricsReporter, PipelineMetrics};
use crate::models::{decompress_model, ModelScorer, OnnxScorer};
use crate::pipeline::ScoringPipeline;
use crate::reference::ReferenceSchema;
use crate::watcher::DirectoryWatcher;
use anyhow::{Context, Result};
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Fully initialised scoring service, ready to watch
pub struct ScoringService {
    config: AppConfig,
    pipeline: Arc<ScoringPipeline>,
    metrics: Arc<PipelineMetrics>,
}

impl ScoringService {
    /// Prepare the model artifact, load the ONNX scorer and build the service
    pub fn bootstrap(config: AppConfig) -> Result<Self> {
        info!("Initializing scoring service");

        decompress_model(&config.model.archive_path, &config.model.model_path)
            .context("Failed to prepare model artifact")?;
        let scorer = OnnxScorer::load(
            &config.model.model_path,
            &config.model.metadata_path,
            config.model.onnx_threads,
        )
        .context("Failed to load model")?;

        Self::with_scorer(config, Arc::new(scorer))
    }

    /// Build the service around an already loaded scorer
    pub fn with_scorer(config: AppConfig, scorer: Arc<dyn ModelScorer>) -> Result<Self> {
        let reference = ReferenceSchema::load(
            &config.reference.train_data_path,
            &config.reference.exclude_columns,
        )
        .context("Failed to load reference training data")?;

        for dir in [&config.paths.input_dir, &config.paths.output_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }

        let metrics = Arc::new(PipelineMetrics::new());
        let writer = ArtifactWriter::new(&config.paths.output_dir, config.plot.clone());
        let pipeline = ScoringPipeline::new(Arc::new(reference), scorer, writer)
            .with_threshold(config.model.threshold)
            .with_top_k(config.model.top_k)
            .with_dedup_capacity(config.pipeline.dedup_capacity)
            .with_metrics(metrics.clone());

        info!(
            input_dir = %config.paths.input_dir.display(),
            output_dir = %config.paths.output_dir.display(),
            threshold = config.model.threshold,
            top_k = config.model.top_k,
            "Service initialized"
        );

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            metrics,
        })
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Watch the input directory until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let watcher = DirectoryWatcher::start(
            &self.config.paths.input_dir,
            &self.config.watcher.extension,
            Duration::from_millis(self.config.watcher.poll_interval_ms),
            self.pipeline.clone(),
        )?;

        let reporter = match self.config.metrics.report_interval_secs {
            0 => None,
            interval => {
                let reporter = MetricsReporter::new(self.metrics.clone(), interval);
                Some(tokio::spawn(reporter.start()))
            }
        };

        shutdown.await;

        info!("Service stopped by user");
        watcher.stop();
        if let Some(reporter) = reporter {
            reporter.abort();
        }
        self.metrics.print_summary();

        Ok(())
    }
}

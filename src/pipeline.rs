//! File processing pipeline: read → preprocess → predict → threshold → persist.
//!
//! [`ScoringPipeline::process_file`] returns the outcome of one invocation as a
//! value. [`ScoringPipeline::handle`] is the isolation boundary used by the
//! watcher: it logs and counts the outcome and never propagates an error, so
//! one bad file cannot stop the service.

use crate::artifacts::{timestamp_token, ArtifactPaths, ArtifactWriter};
use crate::config::{DEFAULT_THRESHOLD, DEFAULT_TOP_K};
use crate::error::{InferenceError, PipelineError};
use crate::metrics::PipelineMetrics;
use crate::models::ModelScorer;
use crate::preprocessing::{Preprocessor, SchemaAligner};
use crate::reference::ReferenceSchema;
use crate::types::{InputTable, PredictionResult};
use crate::watcher::FileArrivalHandler;
use chrono::Local;
use lru::LruCache;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Successful invocation summary
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    pub rows: usize,
    pub positives: usize,
    pub artifacts: ArtifactPaths,
    pub elapsed: Duration,
}

/// Outcome of one pipeline invocation that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Artifact triple written
    Completed(ProcessReport),
    /// Same file content already processed; nothing written
    SkippedDuplicate,
}

/// Size and modification time of an input file as seen on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Scores one input file at a time and persists its artifacts
pub struct ScoringPipeline {
    reference: Arc<ReferenceSchema>,
    preprocessor: Box<dyn Preprocessor>,
    scorer: Arc<dyn ModelScorer>,
    writer: ArtifactWriter,
    threshold: f64,
    top_k: usize,
    /// Stamps of successfully processed files still present in the input directory
    processed: Option<Mutex<LruCache<PathBuf, FileStamp>>>,
    metrics: Arc<PipelineMetrics>,
}

impl ScoringPipeline {
    /// Create a pipeline with the schema-aligning preprocessor, the default
    /// threshold and top-k, and no duplicate-event guard
    pub fn new(
        reference: Arc<ReferenceSchema>,
        scorer: Arc<dyn ModelScorer>,
        writer: ArtifactWriter,
    ) -> Self {
        Self {
            reference,
            preprocessor: Box::new(SchemaAligner::new()),
            scorer,
            writer,
            threshold: DEFAULT_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            processed: None,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Replace the preprocessor
    pub fn with_preprocessor(mut self, preprocessor: Box<dyn Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Set the decision threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set how many features the importance artifact lists
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Remember up to `capacity` processed files and skip repeated creation
    /// events for them while they stay in place (0 disables). A file is
    /// forgotten once it is removed, so a later re-arrival is scored again.
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.processed = NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c)));
        self
    }

    /// Share a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Run one pipeline invocation for `path`
    pub fn process_file(&self, path: &Path) -> Result<ProcessOutcome, PipelineError> {
        let started = Instant::now();
        let stamp = FileStamp::of(path);

        if self.already_processed(path, stamp) {
            return Ok(ProcessOutcome::SkippedDuplicate);
        }

        info!(path = %path.display(), "Processing file");
        let input = InputTable::from_csv_path(path).map_err(|source| PipelineError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(rows = input.row_count(), "Starting preprocessing");
        let processed = self.preprocessor.transform(&self.reference, &input)?;

        debug!("Making prediction");
        let probabilities = self
            .scorer
            .predict_proba(&processed.matrix, &processed.categorical)?;
        if probabilities.len() != input.row_count() {
            return Err(InferenceError::RowCountMismatch {
                expected: input.row_count(),
                actual: probabilities.len(),
            }
            .into());
        }
        let result = PredictionResult::from_probabilities(probabilities, self.threshold);

        debug!("Preparing artifacts");
        let timestamp = timestamp_token(&Local::now());
        let top_features = self.scorer.top_feature_importances(self.top_k);
        let artifacts = self
            .writer
            .write_all(&timestamp, path, &result, &top_features)?;

        self.remember(path, stamp);

        Ok(ProcessOutcome::Completed(ProcessReport {
            rows: result.len(),
            positives: result.positive_count(),
            artifacts,
            elapsed: started.elapsed(),
        }))
    }

    /// Process a file and absorb any failure into logs and metrics
    pub fn handle(&self, path: &Path) {
        match self.process_file(path) {
            Ok(ProcessOutcome::Completed(report)) => {
                self.metrics
                    .record_success(report.elapsed, report.rows, report.positives);
                info!(
                    path = %path.display(),
                    rows = report.rows,
                    positives = report.positives,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    predictions = %report.artifacts.predictions.display(),
                    "File processed"
                );
            }
            Ok(ProcessOutcome::SkippedDuplicate) => {
                self.metrics.record_skip();
                warn!(path = %path.display(), "Duplicate event for an already processed file, skipping");
            }
            Err(e) => {
                self.metrics.record_failure(e.kind());
                error!(
                    path = %path.display(),
                    kind = e.kind(),
                    error = %error_chain(&e),
                    details = ?e,
                    "Error processing file"
                );
            }
        }
    }

    /// Drop the remembered stamp of a file that left the input directory
    pub fn forget(&self, path: &Path) {
        if let Some(processed) = &self.processed {
            if let Ok(mut seen) = processed.lock() {
                if seen.pop(path).is_some() {
                    debug!(path = %path.display(), "Processed file removed from input directory");
                }
            }
        }
    }

    fn already_processed(&self, path: &Path, stamp: Option<FileStamp>) -> bool {
        match (&self.processed, stamp) {
            (Some(processed), Some(stamp)) => processed
                .lock()
                .map(|mut seen| seen.get(path) == Some(&stamp))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn remember(&self, path: &Path, stamp: Option<FileStamp>) {
        if let (Some(processed), Some(stamp)) = (&self.processed, stamp) {
            if let Ok(mut seen) = processed.lock() {
                seen.put(path.to_path_buf(), stamp);
            }
        }
    }
}

impl FileArrivalHandler for ScoringPipeline {
    fn on_file_created(&self, path: &Path) {
        self.handle(path);
    }

    fn on_file_removed(&self, path: &Path) {
        self.forget(path);
    }
}

/// Render an error with all of its sources, outermost first
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlotConfig;
    use crate::error::PreprocessError;
    use crate::reference::{ColumnKind, ReferenceColumn};
    use crate::types::{FeatureImportance, FeatureMatrix};
    use std::sync::atomic::Ordering;

    /// Uses the `score` column as the predicted probability
    struct EchoScorer;

    impl ModelScorer for EchoScorer {
        fn predict_proba(
            &self,
            features: &FeatureMatrix,
            _categorical: &[String],
        ) -> Result<Vec<f64>, InferenceError> {
            Ok((0..features.row_count())
                .map(|i| features.row(i)[0] as f64)
                .collect())
        }

        fn feature_importances(&self) -> Vec<FeatureImportance> {
            vec![
                FeatureImportance::new("score", 10.0),
                FeatureImportance::new("city", 30.0),
            ]
        }
    }

    /// Drops the last probability
    struct ShortScorer;

    impl ModelScorer for ShortScorer {
        fn predict_proba(
            &self,
            features: &FeatureMatrix,
            _categorical: &[String],
        ) -> Result<Vec<f64>, InferenceError> {
            Ok(vec![0.5; features.row_count().saturating_sub(1)])
        }

        fn feature_importances(&self) -> Vec<FeatureImportance> {
            Vec::new()
        }
    }

    fn reference() -> Arc<ReferenceSchema> {
        Arc::new(ReferenceSchema::new(vec![
            ReferenceColumn {
                name: "score".to_string(),
                kind: ColumnKind::Numeric,
            },
            ReferenceColumn {
                name: "city".to_string(),
                kind: ColumnKind::Categorical(vec!["Paris".to_string(), "Rome".to_string()]),
            },
        ]))
    }

    fn pipeline(output: &Path, scorer: Arc<dyn ModelScorer>) -> ScoringPipeline {
        ScoringPipeline::new(
            reference(),
            scorer,
            ArtifactWriter::new(output, PlotConfig::default()),
        )
    }

    fn output_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_process_file_writes_triple() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("batch.csv");
        fs::write(&path, "score,city\n0.99,Paris\n0.95,Rome\n0.10,Oslo\n").unwrap();

        let pipeline = pipeline(output.path(), Arc::new(EchoScorer));
        let outcome = pipeline.process_file(&path).unwrap();

        let report = match outcome {
            ProcessOutcome::Completed(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(report.rows, 3);
        assert_eq!(report.positives, 1);

        let predictions = fs::read_to_string(&report.artifacts.predictions).unwrap();
        // 0.95 sits exactly on the threshold and stays negative
        assert_eq!(predictions, "index,prediction\n0,1\n1,0\n2,0\n");

        let json = fs::read_to_string(&report.artifacts.top_features).unwrap();
        assert_eq!(json, r#"{"city":30.0,"score":10.0}"#);

        assert_eq!(output_files(output.path()).len(), 3);
    }

    #[test]
    fn test_zero_row_file_produces_header_only_predictions() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("empty.csv");
        fs::write(&path, "score,city\n").unwrap();

        let pipeline = pipeline(output.path(), Arc::new(EchoScorer));
        match pipeline.process_file(&path).unwrap() {
            ProcessOutcome::Completed(report) => {
                assert_eq!(report.rows, 0);
                let predictions = fs::read_to_string(&report.artifacts.predictions).unwrap();
                assert_eq!(predictions, "index,prediction\n");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_input_read_error() {
        let output = tempfile::tempdir().unwrap();
        let pipeline = pipeline(output.path(), Arc::new(EchoScorer));

        let err = pipeline
            .process_file(&output.path().join("nope.csv"))
            .unwrap_err();
        assert_eq!(err.kind(), "input_read");
        assert!(output_files(output.path()).is_empty());
    }

    #[test]
    fn test_schema_mismatch_is_preprocess_error() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("batch.csv");
        fs::write(&path, "score\n0.5\n").unwrap();

        let err = pipeline(output.path(), Arc::new(EchoScorer))
            .process_file(&path)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Preprocess(PreprocessError::MissingColumn(ref c)) if c == "city"
        ));
        assert!(output_files(output.path()).is_empty());
    }

    #[test]
    fn test_row_count_mismatch_is_inference_error() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("batch.csv");
        fs::write(&path, "score,city\n0.5,Paris\n0.7,Rome\n").unwrap();

        let err = pipeline(output.path(), Arc::new(ShortScorer))
            .process_file(&path)
            .unwrap_err();
        assert_eq!(err.kind(), "inference");
        assert!(output_files(output.path()).is_empty());
    }

    #[test]
    fn test_handle_swallows_errors_and_counts_them() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let bad = input.path().join("bad.csv");
        let good = input.path().join("good.csv");
        fs::write(&bad, "score,city\n0.5,Paris,extra\n").unwrap();
        fs::write(&good, "score,city\n0.97,Paris\n").unwrap();

        let pipeline = pipeline(output.path(), Arc::new(EchoScorer));
        pipeline.handle(&bad);
        pipeline.handle(&good);

        let metrics = pipeline.metrics();
        assert_eq!(metrics.files_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.files_processed.load(Ordering::Relaxed), 1);

        let files = output_files(output.path());
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.contains("good.csv")));
    }

    #[test]
    fn test_duplicate_event_skipped() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("batch.csv");
        fs::write(&path, "score,city\n0.2,Rome\n").unwrap();

        let pipeline = pipeline(output.path(), Arc::new(EchoScorer)).with_dedup_capacity(8);
        assert!(matches!(
            pipeline.process_file(&path).unwrap(),
            ProcessOutcome::Completed(_)
        ));
        assert_eq!(
            pipeline.process_file(&path).unwrap(),
            ProcessOutcome::SkippedDuplicate
        );
    }

    #[test]
    fn test_file_moved_out_and_back_is_scored_again() {
        let input = tempfile::tempdir().unwrap();
        let parking = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("batch.csv");
        let parked = parking.path().join("batch.csv");
        fs::write(&path, "score,city\n0.2,Rome\n").unwrap();

        let pipeline = pipeline(output.path(), Arc::new(EchoScorer)).with_dedup_capacity(8);
        let first = match pipeline.process_file(&path).unwrap() {
            ProcessOutcome::Completed(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };

        // Rename keeps size and mtime, so only the removal tells the two arrivals apart
        fs::rename(&path, &parked).unwrap();
        pipeline.on_file_removed(&path);
        fs::rename(&parked, &path).unwrap();

        // Next second, so the second triple gets its own timestamp token
        std::thread::sleep(Duration::from_millis(1100));
        let second = match pipeline.process_file(&path).unwrap() {
            ProcessOutcome::Completed(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };

        assert_ne!(first.artifacts, second.artifacts);
        assert_eq!(output_files(output.path()).len(), 6);
    }

    #[test]
    fn test_failed_file_is_retried_on_next_event() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("batch.csv");
        fs::write(&path, "score\n0.2\n").unwrap();

        let pipeline = pipeline(output.path(), Arc::new(EchoScorer)).with_dedup_capacity(8);
        assert!(pipeline.process_file(&path).is_err());
        assert!(pipeline.process_file(&path).is_err());
    }

    #[test]
    fn test_custom_threshold() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("batch.csv");
        fs::write(&path, "score,city\n0.6,Rome\n0.4,Rome\n").unwrap();

        let pipeline = pipeline(output.path(), Arc::new(EchoScorer)).with_threshold(0.5);
        match pipeline.process_file(&path).unwrap() {
            ProcessOutcome::Completed(report) => assert_eq!(report.positives, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = PipelineError::InputRead {
            path: PathBuf::from("/in/x.csv"),
            source: csv::Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )),
        };
        let rendered = error_chain(&err);
        assert!(rendered.starts_with("failed to read input file /in/x.csv"));
        assert!(rendered.contains("no such file"));
    }
}

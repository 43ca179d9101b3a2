//! Batch Scoring Service Library
//!
//! Watches a directory for newly arrived CSV files, scores every row with a
//! pretrained binary classifier, and writes predictions, a feature-importance
//! summary and a probability density plot for each file.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod reference;
pub mod service;
pub mod types;
pub mod watcher;

pub use artifacts::ArtifactWriter;
pub use config::AppConfig;
pub use error::PipelineError;
pub use models::{ModelScorer, OnnxScorer};
pub use pipeline::{ProcessOutcome, ScoringPipeline};
pub use preprocessing::{Preprocessor, SchemaAligner};
pub use reference::ReferenceSchema;
pub use service::ScoringService;
pub use watcher::{DirectoryWatcher, FileArrivalHandler};

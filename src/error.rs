//! Error kinds raised while scoring a single input file.
//!
//! Every failure inside one pipeline invocation ends up as a [`PipelineError`].
//! The pipeline boundary logs it and moves on; nothing here is fatal to the
//! service. Startup failures use `anyhow` instead.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of one pipeline invocation
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input file missing, unreadable or not well-formed CSV
    #[error("failed to read input file {}: {source}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Input does not line up with the reference training schema
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Model query failed
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    /// One of the output artifacts could not be persisted
    #[error("failed to write artifact {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: ArtifactWriteError,
    },
}

impl PipelineError {
    /// Stable label used in log fields and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputRead { .. } => "input_read",
            Self::Preprocess(_) => "preprocess",
            Self::Inference(_) => "inference",
            Self::ArtifactWrite { .. } => "artifact_write",
        }
    }
}

/// Schema mismatch between an input table and the reference schema
#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("input is missing column '{0}' required by the reference schema")]
    MissingColumn(String),

    #[error("column '{column}' row {row}: '{value}' is not a number")]
    InvalidNumber {
        column: String,
        row: usize,
        value: String,
    },
}

/// Failure while querying the model
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("feature columns do not match the model: expected {expected:?}, found {found:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("categorical feature '{0}' is not a model feature")]
    UnknownCategorical(String),

    #[error("model runtime error: {0}")]
    Runtime(String),

    #[error("unexpected model output: {0}")]
    OutputShape(String),

    #[error("model returned {actual} probabilities for {expected} rows")]
    RowCountMismatch { expected: usize, actual: usize },
}

impl From<ort::Error> for InferenceError {
    fn from(value: ort::Error) -> Self {
        Self::Runtime(value.to_string())
    }
}

/// Failure while persisting one artifact
#[derive(Debug, Error)]
pub enum ArtifactWriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plot error: {0}")]
    Plot(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = PipelineError::Preprocess(PreprocessError::MissingColumn("age".to_string()));
        assert_eq!(err.kind(), "preprocess");

        let err = PipelineError::Inference(InferenceError::RowCountMismatch {
            expected: 3,
            actual: 2,
        });
        assert_eq!(err.kind(), "inference");
        assert!(err.to_string().contains("2 probabilities for 3 rows"));

        let err = PipelineError::ArtifactWrite {
            path: PathBuf::from("/out/x.json"),
            source: ArtifactWriteError::Plot("boom".to_string()),
        };
        assert_eq!(err.kind(), "artifact_write");
        assert!(err.to_string().contains("/out/x.json"));
    }
}

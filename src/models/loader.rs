//! ONNX model loader and model artifact preparation

use crate::error::InferenceError;
use crate::types::FeatureMatrix;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for probabilities
    pub output_name: String,
}

/// Feature metadata exported next to the model.
///
/// ONNX graphs carry neither feature names nor importances, so the training
/// job writes them to a JSON sidecar.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// Feature names in the order the model expects them
    pub feature_names: Vec<String>,
    /// Importance per feature, same order as `feature_names`
    pub feature_importances: Vec<f64>,
}

impl ModelMetadata {
    /// Read and validate the metadata sidecar
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open model metadata {}", path.display()))?;
        let metadata: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model metadata {}", path.display()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check that a feature matrix lines up with the model inputs.
    ///
    /// Columns must match `feature_names` exactly, in order, and every
    /// categorical column must be one of them.
    pub fn check_features(
        &self,
        features: &FeatureMatrix,
        categorical: &[String],
    ) -> Result<(), InferenceError> {
        if features.columns() != self.feature_names.as_slice() {
            return Err(InferenceError::FeatureMismatch {
                expected: self.feature_names.clone(),
                found: features.columns().to_vec(),
            });
        }
        if let Some(unknown) = categorical
            .iter()
            .find(|name| !self.feature_names.contains(name))
        {
            return Err(InferenceError::UnknownCategorical(unknown.clone()));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            anyhow::bail!("Model metadata lists no features");
        }
        if self.feature_names.len() != self.feature_importances.len() {
            anyhow::bail!(
                "Model metadata has {} feature names but {} importances",
                self.feature_names.len(),
                self.feature_importances.len()
            );
        }
        Ok(())
    }
}

/// Decompress the gzip model archive into `model_path`.
///
/// When the archive is absent but a decompressed model is already in place,
/// that model is used as is. Returns the number of bytes written (0 when the
/// existing model is reused).
pub fn decompress_model<P: AsRef<Path>, Q: AsRef<Path>>(archive_path: P, model_path: Q) -> Result<u64> {
    let archive_path = archive_path.as_ref();
    let model_path = model_path.as_ref();

    if !archive_path.exists() {
        if model_path.exists() {
            warn!(
                archive = %archive_path.display(),
                model = %model_path.display(),
                "Model archive not found, using existing decompressed model"
            );
            return Ok(0);
        }
        anyhow::bail!(
            "Neither model archive {} nor model {} exists",
            archive_path.display(),
            model_path.display()
        );
    }

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create model directory {}", parent.display()))?;
    }

    let archive = File::open(archive_path)
        .with_context(|| format!("Failed to open model archive {}", archive_path.display()))?;
    let mut decoder = GzDecoder::new(BufReader::new(archive));
    let mut output = BufWriter::new(
        File::create(model_path)
            .with_context(|| format!("Failed to create model file {}", model_path.display()))?,
    );

    let written = io::copy(&mut decoder, &mut output)
        .with_context(|| format!("Failed to decompress model archive {}", archive_path.display()))?;
    output.flush()?;

    info!(
        archive = %archive_path.display(),
        model = %model_path.display(),
        bytes = written,
        "Model archive decompressed"
    );

    Ok(written)
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        // Initialize ONNX Runtime
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel> {
        let path = path.as_ref();

        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "features".to_string());

        // Classifier exports name their probability output "probabilities" or similar
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            session,
            input_name,
            output_name,
        })
    }
}

//! Model scorer: probability and feature-importance queries against the model

use crate::error::InferenceError;
use crate::models::loader::{LoadedModel, ModelLoader, ModelMetadata};
use crate::types::{FeatureImportance, FeatureMatrix};
use anyhow::Result;
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Read-only queries against a pretrained binary classifier.
pub trait ModelScorer: Send + Sync {
    /// Positive-class probability for every row, in row order
    fn predict_proba(
        &self,
        features: &FeatureMatrix,
        categorical: &[String],
    ) -> Result<Vec<f64>, InferenceError>;

    /// Importance of every model feature, in model definition order
    fn feature_importances(&self) -> Vec<FeatureImportance>;

    /// The `k` most important features, highest first.
    ///
    /// Ties keep model definition order.
    fn top_feature_importances(&self, k: usize) -> Vec<FeatureImportance> {
        let mut importances = self.feature_importances();
        importances.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        importances.truncate(k);
        importances
    }
}

/// Scorer backed by an ONNX Runtime session
pub struct OnnxScorer {
    /// Session needs `&mut` to run; calls come from one thread in practice
    model: Mutex<LoadedModel>,
    metadata: ModelMetadata,
}

impl OnnxScorer {
    /// Load the model and its metadata sidecar
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        metadata_path: Q,
        onnx_threads: usize,
    ) -> Result<Self> {
        let metadata = ModelMetadata::load(metadata_path)?;
        let loader = ModelLoader::with_threads(onnx_threads)?;
        let model = loader.load_model(model_path)?;

        info!(
            features = metadata.feature_names.len(),
            "Model scorer initialized"
        );

        Ok(Self {
            model: Mutex::new(model),
            metadata,
        })
    }

    /// `[rows, columns]` input shape, or `None` when there is nothing to score
    fn input_shape(features: &FeatureMatrix) -> Option<Vec<i64>> {
        match features.row_count() {
            0 => None,
            rows => Some(vec![rows as i64, features.column_count() as i64]),
        }
    }

    /// Extract one positive-class probability per row from the session outputs.
    ///
    /// Handles tensor outputs (`[n, 2]`, `[n, 1]`, `[n]`) and the
    /// `seq(map(int64, float))` layout produced by gradient-boosting exports.
    fn extract_probabilities(
        outputs: &ort::session::SessionOutputs,
        output_name: &str,
        rows: usize,
    ) -> Result<Vec<f64>, InferenceError> {
        let output = match outputs.get(output_name) {
            Some(output) => output,
            None => {
                return Err(InferenceError::OutputShape(format!(
                    "output '{}' missing from model results",
                    output_name
                )))
            }
        };

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return Self::probabilities_from_tensor(&dims, data, rows);
        }

        let dtype = output.dtype();
        if DynSequenceValueType::can_downcast(&dtype) {
            return Self::probabilities_from_sequence_map(output);
        }

        Err(InferenceError::OutputShape(format!(
            "output '{}' is neither a float tensor nor a sequence of maps",
            output_name
        )))
    }

    fn probabilities_from_tensor(
        dims: &[i64],
        data: &[f32],
        rows: usize,
    ) -> Result<Vec<f64>, InferenceError> {
        match dims {
            // [batch, num_classes] - positive class is column 1
            [_, classes] if *classes >= 2 => {
                let classes = *classes as usize;
                Ok(data
                    .chunks(classes)
                    .take(rows)
                    .map(|row| row[1] as f64)
                    .collect())
            }
            // [batch, 1] or [batch] - already a single probability
            [_, 1] | [_] => Ok(data.iter().take(rows).map(|&p| p as f64).collect()),
            _ => Err(InferenceError::OutputShape(format!(
                "unsupported probability tensor shape {:?}",
                dims
            ))),
        }
    }

    fn probabilities_from_sequence_map(
        output: &ort::value::DynValue,
    ) -> Result<Vec<f64>, InferenceError> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| InferenceError::OutputShape(format!("not a sequence: {}", e)))?;

        // One map per row: class id -> probability
        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

        maps.iter()
            .map(|map_value| {
                let pairs = map_value.try_extract_key_values::<i64, f32>()?;
                if let Some((_, prob)) = pairs.iter().find(|(class_id, _)| *class_id == 1) {
                    return Ok(*prob as f64);
                }
                if let Some((_, prob)) = pairs.iter().find(|(class_id, _)| *class_id == 0) {
                    return Ok(1.0 - *prob as f64);
                }
                Err(InferenceError::OutputShape(
                    "no class probability found in map".to_string(),
                ))
            })
            .collect()
    }
}

impl ModelScorer for OnnxScorer {
    fn predict_proba(
        &self,
        features: &FeatureMatrix,
        categorical: &[String],
    ) -> Result<Vec<f64>, InferenceError> {
        use ort::value::Tensor;

        self.metadata.check_features(features, categorical)?;

        let shape = match Self::input_shape(features) {
            Some(shape) => shape,
            None => return Ok(Vec::new()),
        };
        let rows = features.row_count();
        let input_tensor = Tensor::from_array((shape, features.values().to_vec()))?;

        let mut model = self
            .model
            .lock()
            .map_err(|e| InferenceError::Runtime(format!("Lock error: {}", e)))?;
        let LoadedModel {
            session,
            input_name,
            output_name,
        } = &mut *model;

        let outputs = session.run(ort::inputs![input_name.as_str() => input_tensor])?;
        let probabilities = Self::extract_probabilities(&outputs, output_name, rows)?;

        if probabilities.len() != rows {
            return Err(InferenceError::RowCountMismatch {
                expected: rows,
                actual: probabilities.len(),
            });
        }

        debug!(rows = rows, "Batch inference complete");
        Ok(probabilities)
    }

    fn feature_importances(&self) -> Vec<FeatureImportance> {
        self.metadata
            .feature_names
            .iter()
            .zip(&self.metadata.feature_importances)
            .map(|(name, &score)| FeatureImportance::new(name.clone(), score))
            .collect()
    }
}

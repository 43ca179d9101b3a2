//! Prediction results and feature importances

use serde::{Deserialize, Serialize};

/// Binary decision for one input row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRow {
    /// Row index in the original input file
    pub index: usize,
    /// 1 when the probability exceeds the threshold, else 0
    pub prediction: u8,
}

/// Apply the decision rule: positive iff `probability > threshold`
pub fn decide(probability: f64, threshold: f64) -> u8 {
    u8::from(probability > threshold)
}

/// Thresholded predictions of one input file
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub rows: Vec<PredictionRow>,
    /// Raw positive-class probabilities, same order as `rows`
    pub probabilities: Vec<f64>,
}

impl PredictionResult {
    /// Threshold probabilities, keyed by original row index
    pub fn from_probabilities(probabilities: Vec<f64>, threshold: f64) -> Self {
        let rows = probabilities
            .iter()
            .enumerate()
            .map(|(index, &p)| PredictionRow {
                index,
                prediction: decide(p, threshold),
            })
            .collect();

        Self {
            rows,
            probabilities,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows classified positive
    pub fn positive_count(&self) -> usize {
        self.rows.iter().filter(|r| r.prediction == 1).count()
    }
}

/// Importance score of one model feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub score: f64,
}

impl FeatureImportance {
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

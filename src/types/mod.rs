//! Type definitions for the batch scoring service

pub mod prediction;
pub mod table;

pub use prediction::{decide, FeatureImportance, PredictionResult, PredictionRow};
pub use table::{FeatureMatrix, InputTable, ProcessedFeatures};

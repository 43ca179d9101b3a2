//! ML model components

pub mod loader;
pub mod scorer;

pub use loader::{decompress_model, ModelLoader, ModelMetadata};
pub use scorer::{ModelScorer, OnnxScorer};

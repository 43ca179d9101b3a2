//! Preprocessing of raw input tables into model-ready features.
//!
//! The [`Preprocessor`] trait is the seam between the pipeline and the
//! feature-engineering logic. [`SchemaAligner`] is the stock implementation:
//! it projects the input onto the reference schema, in reference order.

use crate::error::PreprocessError;
use crate::reference::{ColumnKind, ReferenceSchema};
use crate::types::{FeatureMatrix, InputTable, ProcessedFeatures};
use tracing::debug;

/// Code given to a categorical value never seen in training
pub const UNKNOWN_CATEGORY: f32 = -1.0;

/// Transforms an input table into a feature matrix the model accepts.
pub trait Preprocessor: Send + Sync {
    fn transform(
        &self,
        reference: &ReferenceSchema,
        input: &InputTable,
    ) -> Result<ProcessedFeatures, PreprocessError>;
}

/// Aligns input columns with the reference training schema.
///
/// Numeric columns are parsed as `f32` (empty cells become NaN, which the
/// gradient-boosting model treats as missing). Categorical columns are encoded
/// as the position of the value in the sorted training categories.
/// Input columns unknown to the schema are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaAligner;

impl SchemaAligner {
    pub fn new() -> Self {
        Self
    }
}

impl Preprocessor for SchemaAligner {
    fn transform(
        &self,
        reference: &ReferenceSchema,
        input: &InputTable,
    ) -> Result<ProcessedFeatures, PreprocessError> {
        // Resolve every reference column once, in reference order
        let positions = reference
            .columns()
            .iter()
            .map(|column| {
                input
                    .column_index(&column.name)
                    .ok_or_else(|| PreprocessError::MissingColumn(column.name.clone()))
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let ignored = input.headers().len().saturating_sub(positions.len());
        if ignored > 0 {
            debug!(ignored_columns = ignored, "Dropping input columns unknown to the reference schema");
        }

        let width = positions.len();
        let mut values = Vec::with_capacity(input.row_count() * width);

        for (row_index, row) in input.rows().iter().enumerate() {
            for (column, &position) in reference.columns().iter().zip(&positions) {
                let raw = row.get(position).map(|v| v.trim()).unwrap_or("");
                let value = match &column.kind {
                    ColumnKind::Numeric => parse_numeric(raw).ok_or_else(|| {
                        PreprocessError::InvalidNumber {
                            column: column.name.clone(),
                            row: row_index,
                            value: raw.to_string(),
                        }
                    })?,
                    ColumnKind::Categorical(categories) => encode_category(categories, raw),
                };
                values.push(value);
            }
        }

        Ok(ProcessedFeatures {
            matrix: FeatureMatrix::new(reference.feature_names(), values, input.row_count()),
            categorical: reference.categorical_names(),
        })
    }
}

fn parse_numeric(raw: &str) -> Option<f32> {
    if raw.is_empty() {
        return Some(f32::NAN);
    }
    raw.parse::<f32>().ok()
}

fn encode_category(categories: &[String], raw: &str) -> f32 {
    categories
        .binary_search_by(|c| c.as_str().cmp(raw))
        .map(|position| position as f32)
        .unwrap_or(UNKNOWN_CATEGORY)
}

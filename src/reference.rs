//! Reference training schema: the column layout the model was trained on.
//!
//! Loaded once at startup from the training CSV. A column is numeric when
//! every non-empty training value parses as a number; otherwise it is
//! categorical and remembers its distinct training values.

use crate::types::InputTable;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// Kind of a reference column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Numeric,
    /// Sorted distinct values seen in training
    Categorical(Vec<String>),
}

/// One feature column of the reference schema
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl ReferenceColumn {
    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, ColumnKind::Categorical(_))
    }
}

/// Immutable schema shared by every pipeline invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSchema {
    columns: Vec<ReferenceColumn>,
}

impl ReferenceSchema {
    pub fn new(columns: Vec<ReferenceColumn>) -> Self {
        Self { columns }
    }

    /// Load the training CSV and infer the schema, skipping `exclude` columns
    pub fn load<P: AsRef<Path>>(path: P, exclude: &[String]) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading reference training data");

        let table = InputTable::from_csv_path(path)
            .with_context(|| format!("Failed to read reference data from {}", path.display()))?;
        if table.headers().is_empty() {
            anyhow::bail!("Reference data {} has no columns", path.display());
        }

        let schema = Self::infer(&table, exclude);
        if schema.columns.is_empty() {
            anyhow::bail!(
                "Reference data {} has no feature columns left after exclusions",
                path.display()
            );
        }

        info!(
            rows = table.row_count(),
            features = schema.columns.len(),
            categorical = schema.categorical_names().len(),
            "Reference schema loaded"
        );

        Ok(schema)
    }

    /// Infer column kinds from a training table
    pub fn infer(table: &InputTable, exclude: &[String]) -> Self {
        let columns = table
            .headers()
            .iter()
            .enumerate()
            .filter(|(_, name)| !exclude.iter().any(|e| e == *name))
            .map(|(index, name)| {
                let values: Vec<&str> = table
                    .column_values(index)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .collect();

                let numeric = values.iter().all(|v| v.parse::<f64>().is_ok());
                let kind = if numeric {
                    ColumnKind::Numeric
                } else {
                    let distinct: BTreeSet<&str> = values.into_iter().collect();
                    ColumnKind::Categorical(distinct.into_iter().map(str::to_string).collect())
                };

                ReferenceColumn {
                    name: name.clone(),
                    kind,
                }
            })
            .collect();

        Self { columns }
    }

    pub fn columns(&self) -> &[ReferenceColumn] {
        &self.columns
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn categorical_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_categorical())
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training_table() -> InputTable {
        let data = "id,age,city,income,target\n\
                    1,31,Paris,1200.5,0\n\
                    2,45,Rome,,1\n\
                    3,27,Paris,900,0\n";
        InputTable::from_reader(data.as_bytes()).unwrap()
    }

    #[test]
    fn test_infer_kinds() {
        let schema = ReferenceSchema::infer(&training_table(), &["id".to_string(), "target".to_string()]);

        assert_eq!(schema.feature_names(), vec!["age", "city", "income"]);
        assert_eq!(schema.columns()[0].kind, ColumnKind::Numeric);
        assert_eq!(
            schema.columns()[1].kind,
            ColumnKind::Categorical(vec!["Paris".to_string(), "Rome".to_string()])
        );
        // Empty cells do not make a numeric column categorical
        assert_eq!(schema.columns()[2].kind, ColumnKind::Numeric);
        assert_eq!(schema.categorical_names(), vec!["city"]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReferenceSchema::load(dir.path().join("train.csv"), &[]).is_err());
    }

    #[test]
    fn test_load_rejects_fully_excluded_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "target\n1\n0\n").unwrap();
        assert!(ReferenceSchema::load(&path, &["target".to_string()]).is_err());
    }
}

//! Tabular data structures: raw input tables and model-ready feature matrices

use std::io::Read;
use std::path::Path;

/// Raw CSV table as read from an input file.
///
/// Values are kept as strings; interpretation happens in preprocessing.
/// Row `i` (0-based, header excluded) is the record with original index `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl InputTable {
    /// Build a table from already parsed parts
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a CSV file with a header row.
    ///
    /// Records with a different width than the header are rejected.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_path(path)?;
        Self::from_csv_reader(reader)
    }

    /// Read CSV from any reader (used for in-memory data)
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        Self::from_csv_reader(reader)
    }

    fn from_csv_reader<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, csv::Error> {
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over the values of one column
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }
}

/// Model-ready feature matrix, row-major, columns in model order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Vec<f32>,
    rows: usize,
}

impl FeatureMatrix {
    /// Build a matrix from row-major values.
    ///
    /// Only the preprocessor builds matrices, and it always fills every cell.
    /// Panics if `values.len()` is not `rows * columns.len()`.
    pub(crate) fn new(columns: Vec<String>, values: Vec<f32>, rows: usize) -> Self {
        assert_eq!(
            values.len(),
            rows * columns.len(),
            "feature matrix values do not match its shape"
        );
        Self {
            columns,
            values,
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All values, row-major
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// One row of features
    pub fn row(&self, index: usize) -> &[f32] {
        let width = self.columns.len();
        &self.values[index * width..(index + 1) * width]
    }
}

/// Output of the preprocessor: the matrix plus the names of its categorical columns
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFeatures {
    pub matrix: FeatureMatrix,
    pub categorical: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_table() {
        let data = "age,city\n31,Paris\n45,Rome\n";
        let table = InputTable::from_reader(data.as_bytes()).unwrap();

        assert_eq!(table.headers(), &["age".to_string(), "city".to_string()]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_index("city"), Some(1));
        let cities: Vec<&str> = table.column_values(1).collect();
        assert_eq!(cities, vec!["Paris", "Rome"]);
    }

    #[test]
    fn test_header_only_table_is_empty() {
        let table = InputTable::from_reader("age,city\n".as_bytes()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.headers().len(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let data = "age,city\n31,Paris\n45\n";
        assert!(InputTable::from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_matrix_rows() {
        let matrix = FeatureMatrix::new(
            vec!["a".to_string(), "b".to_string()],
            vec![1.0, 2.0, 3.0, 4.0],
            2,
        );
        assert_eq!(matrix.row(1), &[3.0, 4.0]);
        assert_eq!(matrix.column_count(), 2);
    }

    #[test]
    #[should_panic(expected = "feature matrix values do not match its shape")]
    fn test_matrix_shape_mismatch_panics() {
        FeatureMatrix::new(vec!["a".to_string(), "b".to_string()], vec![1.0, 2.0, 3.0], 2);
    }
}

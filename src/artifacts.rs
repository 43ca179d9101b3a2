//! Artifact writer: persists the output triple of one pipeline invocation
//!
//! Every invocation produces, under one shared timestamp token:
//! - `predictions_<ts>_<input>`: CSV with `index,prediction`
//! - `top_features_<ts>_<input>_top_features.json`: `{feature: importance}`
//! - `preds_density_<ts>_<input>_pred_density.png`: probability histogram

use crate::config::PlotConfig;
use crate::error::{ArtifactWriteError, PipelineError};
use crate::types::{FeatureImportance, PredictionResult};
use chrono::{DateTime, TimeZone};
use plotters::prelude::*;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Timestamp token format shared by all artifacts of one invocation
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Render a timestamp token (`YYYYMMDD_HHMMSS`)
pub fn timestamp_token<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Output file locations of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub predictions: PathBuf,
    pub top_features: PathBuf,
    pub density_plot: PathBuf,
}

impl ArtifactPaths {
    pub fn all(&self) -> [&Path; 3] {
        [&self.predictions, &self.top_features, &self.density_plot]
    }
}

/// Writes prediction outputs into the output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    plot: PlotConfig,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, plot: PlotConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            plot,
        }
    }

    /// Artifact paths for an input file and a timestamp token
    pub fn paths_for(&self, timestamp: &str, source: &Path) -> ArtifactPaths {
        let basename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());

        ArtifactPaths {
            predictions: self
                .output_dir
                .join(format!("predictions_{}_{}", timestamp, basename)),
            top_features: self.output_dir.join(format!(
                "top_features_{}_{}_top_features.json",
                timestamp, basename
            )),
            density_plot: self.output_dir.join(format!(
                "preds_density_{}_{}_pred_density.png",
                timestamp, basename
            )),
        }
    }

    /// Persist all three artifacts.
    ///
    /// Each artifact is attempted even when an earlier one failed; the first
    /// failure is returned.
    pub fn write_all(
        &self,
        timestamp: &str,
        source: &Path,
        result: &PredictionResult,
        top_features: &[FeatureImportance],
    ) -> Result<ArtifactPaths, PipelineError> {
        let paths = self.paths_for(timestamp, source);

        let outcomes = [
            (
                paths.predictions.as_path(),
                write_predictions(&paths.predictions, result),
            ),
            (
                paths.top_features.as_path(),
                write_top_features(&paths.top_features, top_features),
            ),
            (
                paths.density_plot.as_path(),
                write_density_plot(&paths.density_plot, &result.probabilities, &self.plot),
            ),
        ];

        let mut first_failure = None;
        for (path, outcome) in outcomes {
            match outcome {
                Ok(()) => info!(artifact = %path.display(), "Artifact saved"),
                Err(e) => {
                    error!(artifact = %path.display(), error = %e, "Failed to save artifact");
                    if first_failure.is_none() {
                        first_failure = Some(PipelineError::ArtifactWrite {
                            path: path.to_path_buf(),
                            source: e,
                        });
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(paths),
        }
    }
}

/// Write the predictions table (`index,prediction`)
pub fn write_predictions(path: &Path, result: &PredictionResult) -> Result<(), ArtifactWriteError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["index", "prediction"])?;
    for row in &result.rows {
        writer.write_record([row.index.to_string(), row.prediction.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the feature-importance JSON object, keys in the given order
pub fn write_top_features(
    path: &Path,
    top_features: &[FeatureImportance],
) -> Result<(), ArtifactWriteError> {
    let mut object = Map::new();
    for feature in top_features {
        object.insert(feature.name.clone(), Value::from(feature.score));
    }

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &Value::Object(object))?;
    Ok(())
}

/// Normalized histogram of probabilities over `[0, 1]`.
///
/// Bar areas sum to 1 when at least one finite value is present; out of range
/// values are clamped and non-finite ones ignored.
pub fn density_histogram(values: &[f64], bins: usize) -> Vec<f64> {
    if bins == 0 {
        return Vec::new();
    }

    let mut counts = vec![0_u64; bins];
    for &value in values.iter().filter(|v| v.is_finite()) {
        let bin = ((value.clamp(0.0, 1.0) * bins as f64) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    let total: u64 = counts.iter().sum();
    if total == 0 {
        return vec![0.0; bins];
    }

    let bin_width = 1.0 / bins as f64;
    counts
        .into_iter()
        .map(|count| count as f64 / (total as f64 * bin_width))
        .collect()
}

/// Render the probability density histogram as a PNG
pub fn write_density_plot(
    path: &Path,
    probabilities: &[f64],
    plot: &PlotConfig,
) -> Result<(), ArtifactWriteError> {
    let densities = density_histogram(probabilities, plot.bins);
    let bin_width = 1.0 / plot.bins.max(1) as f64;
    let y_max = densities.iter().copied().fold(1.0_f64, f64::max) * 1.05;

    let root = BitMapBackend::new(path, (plot.width, plot.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.0_f64..1.0_f64, 0.0_f64..y_max)
        .map_err(plot_error)?;

    // Horizontal grid lines
    let grid_style = RGBColor(220, 220, 220);
    chart
        .draw_series((1..5).map(|i| {
            let y = y_max * i as f64 / 5.0;
            PathElement::new(vec![(0.0, y), (1.0, y)], grid_style)
        }))
        .map_err(plot_error)?;

    chart
        .draw_series(densities.iter().enumerate().map(|(i, &density)| {
            let x0 = i as f64 * bin_width;
            Rectangle::new([(x0, 0.0), (x0 + bin_width, density)], BLUE.mix(0.7).filled())
        }))
        .map_err(plot_error)?;

    // Axes
    chart
        .draw_series([
            PathElement::new(vec![(0.0, 0.0), (1.0, 0.0)], BLACK),
            PathElement::new(vec![(0.0, 0.0), (0.0, y_max)], BLACK),
        ])
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

fn plot_error<E: std::fmt::Display>(e: E) -> ArtifactWriteError {
    ArtifactWriteError::Plot(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::fs;

    fn writer(dir: &Path) -> ArtifactWriter {
        ArtifactWriter::new(dir, PlotConfig::default())
    }

    #[test]
    fn test_timestamp_token_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(timestamp_token(&at), "20240309_070501");
    }

    #[test]
    fn test_artifact_names_share_timestamp() {
        let writer = writer(Path::new("/out"));
        let paths = writer.paths_for("20240309_070501", Path::new("/in/batch1.csv"));

        assert_eq!(
            paths.predictions,
            PathBuf::from("/out/predictions_20240309_070501_batch1.csv")
        );
        assert_eq!(
            paths.top_features,
            PathBuf::from("/out/top_features_20240309_070501_batch1.csv_top_features.json")
        );
        assert_eq!(
            paths.density_plot,
            PathBuf::from("/out/preds_density_20240309_070501_batch1.csv_pred_density.png")
        );
    }

    #[test]
    fn test_artifact_names_do_not_collide_across_runs() {
        let writer = writer(Path::new("/out"));
        let first = writer.paths_for("20240309_070501", Path::new("batch1.csv"));
        let second = writer.paths_for("20240309_070502", Path::new("batch1.csv"));
        for (a, b) in first.all().iter().zip(second.all().iter()) {
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_density_histogram_normalized() {
        let values = [0.0, 0.1, 0.1, 0.5, 0.99, 1.0];
        let densities = density_histogram(&values, 50);
        assert_eq!(densities.len(), 50);

        let area: f64 = densities.iter().map(|d| d * (1.0 / 50.0)).sum();
        assert!((area - 1.0).abs() < 1e-9);
        // 1.0 lands in the last bin, not past it
        assert!(densities[49] > 0.0);
    }

    #[test]
    fn test_density_histogram_empty() {
        assert!(density_histogram(&[], 50).iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_write_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let result = PredictionResult::from_probabilities(vec![0.2, 0.97, 0.95], 0.95);
        let top = vec![
            FeatureImportance::new("income", 41.5),
            FeatureImportance::new("age", 12.0),
        ];

        let paths = writer
            .write_all("20240309_070501", Path::new("batch1.csv"), &result, &top)
            .unwrap();

        let predictions = fs::read_to_string(&paths.predictions).unwrap();
        assert_eq!(predictions, "index,prediction\n0,0\n1,1\n2,0\n");

        let json = fs::read_to_string(&paths.top_features).unwrap();
        assert_eq!(json, r#"{"income":41.5,"age":12.0}"#);

        assert!(fs::metadata(&paths.density_plot).unwrap().len() > 0);
    }

    #[test]
    fn test_write_all_reports_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(&dir.path().join("missing"));
        let result = PredictionResult::from_probabilities(vec![0.5], 0.95);

        let err = writer
            .write_all("20240309_070501", Path::new("batch1.csv"), &result, &[])
            .unwrap_err();
        assert_eq!(err.kind(), "artifact_write");
    }
}

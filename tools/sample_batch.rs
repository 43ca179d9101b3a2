//! Sample Batch Generator
//!
//! Draws random rows from the reference training CSV and drops them into the
//! service's input directory as a new batch file. Paths and excluded label
//! columns default to the service configuration.

use anyhow::{bail, Context, Result};
use batch_scoring_service::config::AppConfig;
use chrono::Utc;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Row sampler over a loaded reference file
struct BatchSampler {
    headers: csv::StringRecord,
    rows: Vec<csv::StringRecord>,
    exclude_columns: Vec<String>,
    rng: rand::rngs::ThreadRng,
}

impl BatchSampler {
    fn load(path: &Path, exclude_columns: &[String]) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open reference data {}", path.display()))?;
        let headers = reader.headers()?.clone();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            bail!("Reference data {} has no rows to sample", path.display());
        }

        Ok(Self {
            headers,
            rows,
            exclude_columns: exclude_columns.to_vec(),
            rng: rand::thread_rng(),
        })
    }

    /// Header positions kept in the batch (everything except label columns)
    fn kept_columns(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !self.exclude_columns.iter().any(|c| c.as_str() == *name))
            .map(|(i, _)| i)
            .collect()
    }

    fn sample(&mut self) -> &csv::StringRecord {
        let index = self.rng.gen_range(0..self.rows.len());
        &self.rows[index]
    }

    /// Fresh `batch_<timestamp>_<suffix>.csv` path that does not exist yet
    fn batch_path(&mut self, dir: &Path) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        loop {
            let name = format!("batch_{}_{:08x}.csv", timestamp, self.rng.gen::<u32>());
            let path = dir.join(name);
            if !path.exists() {
                return path;
            }
        }
    }

    /// Write `count` sampled rows to a new batch file in `dir`.
    ///
    /// The file is written under a `.part` name first and renamed into place,
    /// so the watcher only ever sees a complete file.
    fn write_batch(&mut self, dir: &Path, count: usize) -> Result<PathBuf> {
        let kept = self.kept_columns();
        let target = self.batch_path(dir);
        let mut staging = target.clone().into_os_string();
        staging.push(".part");
        let staging = PathBuf::from(staging);

        {
            let mut writer = csv::Writer::from_path(&staging)
                .with_context(|| format!("Failed to create {}", staging.display()))?;
            writer.write_record(kept.iter().map(|&i| &self.headers[i]))?;
            for _ in 0..count {
                let row = self.sample();
                writer.write_record(kept.iter().map(|&i| row.get(i).unwrap_or("")))?;
            }
            writer.flush()?;
        }

        fs::rename(&staging, &target)
            .with_context(|| format!("Failed to move batch into {}", target.display()))?;
        Ok(target)
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_batch=info".parse()?),
        )
        .init();

    let config = AppConfig::load()?;

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let reference = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.reference.train_data_path.clone());
    let input_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.paths.input_dir.clone());
    let count: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        reference = %reference.display(),
        input_dir = %input_dir.display(),
        count = count,
        exclude_columns = ?config.reference.exclude_columns,
        "Configuration loaded"
    );

    fs::create_dir_all(&input_dir)
        .with_context(|| format!("Failed to create {}", input_dir.display()))?;

    let mut sampler = BatchSampler::load(&reference, &config.reference.exclude_columns)?;
    let path = sampler.write_batch(&input_dir, count)?;

    info!(path = %path.display(), rows = count, "Sample batch written");
    Ok(())
}

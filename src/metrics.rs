//! Processing statistics for the scoring service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline invocations
pub struct PipelineMetrics {
    /// Files scored and persisted
    pub files_processed: AtomicU64,
    /// Files whose invocation ended in an error
    pub files_failed: AtomicU64,
    /// Duplicate events skipped
    pub files_skipped: AtomicU64,
    /// Rows scored across all files
    pub rows_scored: AtomicU64,
    /// Rows classified positive
    pub positive_rows: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Processing times per file (in milliseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            files_processed: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            positive_rows: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(256)),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully processed file
    pub fn record_success(&self, processing_time: Duration, rows: usize, positives: usize) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows as u64, Ordering::Relaxed);
        self.positive_rows.fetch_add(positives as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_millis() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record a failed file
    pub fn record_failure(&self, kind: &'static str) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    /// Record a skipped duplicate event
    pub fn record_skip(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_ms: sum / count as u64,
            p50_ms: sorted[count / 2],
            p95_ms: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            max_ms: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get failures by error kind
    pub fn get_failures_by_kind(&self) -> HashMap<&'static str, u64> {
        self.failures_by_kind
            .read()
            .map(|by_kind| by_kind.clone())
            .unwrap_or_default()
    }

    /// Files handled per minute since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64() / 60.0;
        let handled = self.files_processed.load(Ordering::Relaxed)
            + self.files_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            handled as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let processed = self.files_processed.load(Ordering::Relaxed);
        let failed = self.files_failed.load(Ordering::Relaxed);
        let skipped = self.files_skipped.load(Ordering::Relaxed);
        let rows = self.rows_scored.load(Ordering::Relaxed);
        let positives = self.positive_rows.load(Ordering::Relaxed);
        let positive_rate = if rows > 0 {
            (positives as f64 / rows as f64) * 100.0
        } else {
            0.0
        };
        let stats = self.get_processing_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              BATCH SCORING SERVICE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Files processed: {:>6}  failed: {:>6}  skipped: {:>6}      ║",
            processed, failed, skipped
        );
        info!(
            "║ Rows scored: {:>10}  positive: {:>8} ({:>5.1}%)          ║",
            rows, positives, positive_rate
        );
        info!(
            "║ Processing Time (ms): mean={:>6} p50={:>6} p95={:>6} max={:>6} ║",
            stats.mean_ms, stats.p50_ms, stats.p95_ms, stats.max_ms
        );
        info!(
            "║ Throughput: {:>6.2} files/min                                  ║",
            self.get_throughput()
        );

        let failures = self.get_failures_by_kind();
        if !failures.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by kind:                                            ║");
            for (kind, count) in &failures {
                info!("║   {:16}: {:>6}                                      ║", kind, count);
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_success(Duration::from_millis(120), 100, 3);
        metrics.record_success(Duration::from_millis(80), 50, 0);
        metrics.record_failure("input_read");
        metrics.record_failure("input_read");
        metrics.record_failure("inference");
        metrics.record_skip();

        assert_eq!(metrics.files_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.files_failed.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.files_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rows_scored.load(Ordering::Relaxed), 150);
        assert_eq!(metrics.positive_rows.load(Ordering::Relaxed), 3);

        let failures = metrics.get_failures_by_kind();
        assert_eq!(failures.get("input_read"), Some(&2));
        assert_eq!(failures.get("inference"), Some(&1));
    }

    #[test]
    fn test_processing_stats() {
        let metrics = PipelineMetrics::new();
        for ms in [10, 20, 30, 40] {
            metrics.record_success(Duration::from_millis(ms), 1, 0);
        }

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_ms, 25);
        assert_eq!(stats.max_ms, 40);
    }
}

//! Counters and latency statistics for a prediction session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for one session
pub struct SessionMetrics {
    /// Models loaded successfully
    pub models_loaded: AtomicU64,
    /// Load attempts that failed
    pub load_failures: AtomicU64,
    /// Single-record predictions that succeeded
    pub single_predictions: AtomicU64,
    /// Batch runs that succeeded
    pub batch_runs: AtomicU64,
    /// Rows scored across all successful batches
    pub rows_scored: AtomicU64,
    /// Failed single or batch predictions
    pub prediction_failures: AtomicU64,
    /// Scoring latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            models_loaded: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            single_predictions: AtomicU64::new(0),
            batch_runs: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            prediction_failures: AtomicU64::new(0),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    pub fn record_load(&self, ok: bool) {
        if ok {
            self.models_loaded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_single(&self, elapsed: Duration) {
        self.single_predictions.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_batch(&self, rows: usize, elapsed: Duration) {
        self.batch_runs.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows as u64, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_failure(&self) {
        self.prediction_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, elapsed: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(elapsed.as_micros() as u64);
            // Keep only the most recent half once the window fills
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    /// Latency statistics over the current window
    pub fn latency_stats(&self) -> LatencyStats {
        let Ok(times) = self.latencies.read() else {
            return LatencyStats::default();
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            max_us: sorted[count - 1],
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log a summary of the session so far
    pub fn print_summary(&self) {
        let latency = self.latency_stats();

        info!(
            uptime_s = self.uptime().as_secs(),
            models_loaded = self.models_loaded.load(Ordering::Relaxed),
            load_failures = self.load_failures.load(Ordering::Relaxed),
            "Session summary"
        );
        info!(
            single = self.single_predictions.load(Ordering::Relaxed),
            batches = self.batch_runs.load(Ordering::Relaxed),
            rows = self.rows_scored.load(Ordering::Relaxed),
            failures = self.prediction_failures.load(Ordering::Relaxed),
            "Predictions"
        );
        if latency.count > 0 {
            info!(
                "Scoring latency (μs): mean={} p50={} p95={} max={} (calls={})",
                latency.mean_us, latency.p50_us, latency.p95_us, latency.max_us, latency.count
            );
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMetrics")
            .field("models_loaded", &self.models_loaded)
            .field("single_predictions", &self.single_predictions)
            .field("batch_runs", &self.batch_runs)
            .field("prediction_failures", &self.prediction_failures)
            .finish_non_exhaustive()
    }
}

/// Scoring latency statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub max_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = SessionMetrics::new();

        metrics.record_load(true);
        metrics.record_load(false);
        metrics.record_single(Duration::from_micros(100));
        metrics.record_batch(3, Duration::from_micros(300));
        metrics.record_failure();

        assert_eq!(metrics.models_loaded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.load_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.single_predictions.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.batch_runs.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rows_scored.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.prediction_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = SessionMetrics::new();
        assert_eq!(metrics.latency_stats(), LatencyStats::default());

        for us in 1..=100 {
            metrics.record_single(Duration::from_micros(us));
        }

        let stats = metrics.latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.mean_us, 50);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p95_us, 96);
        assert_eq!(stats.max_us, 100);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = SessionMetrics::new();
        for _ in 0..=LATENCY_WINDOW {
            metrics.record_single(Duration::from_micros(1));
        }
        assert!(metrics.latency_stats().count as usize <= LATENCY_WINDOW);
    }
}

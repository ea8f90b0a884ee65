//! End-to-end check latency tracking.

use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

/// Microsecond latency samples with percentile summaries. Samples accumulate
/// for the life of the worker process.
pub struct LatencyTracker {
    samples_us: Mutex<Vec<u64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            samples_us: Mutex::new(Vec::with_capacity(10_000)),
        }
    }

    pub fn record(&self, latency: Duration) {
        self.samples_us
            .lock()
            .unwrap()
            .push(latency.as_micros() as u64);
    }

    pub fn summary(&self) -> LatencySummary {
        let samples = self.samples_us.lock().unwrap();
        if samples.is_empty() {
            return LatencySummary::default();
        }
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let at = |pct: usize| sorted[(sorted.len() * pct / 100).min(sorted.len() - 1)];
        LatencySummary {
            samples: sorted.len(),
            p50_us: at(50),
            p95_us: at(95),
            p99_us: at(99),
            max_us: sorted[sorted.len() - 1],
        }
    }

    /// Emit the current percentile summary as a structured log line.
    pub fn log_summary(&self) {
        let summary = self.summary();
        if summary.samples == 0 {
            return;
        }
        info!(
            samples = summary.samples,
            p50_ms = summary.p50_us as f64 / 1000.0,
            p95_ms = summary.p95_us as f64 / 1000.0,
            p99_ms = summary.p99_us as f64 / 1000.0,
            max_ms = summary.max_us as f64 / 1000.0,
            "check latency percentiles"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_reports_zeroes() {
        let tracker = LatencyTracker::new();
        assert_eq!(tracker.summary(), LatencySummary::default());
    }

    #[test]
    fn percentiles_over_known_distribution() {
        let tracker = LatencyTracker::new();
        // 1ms..=100ms in milliseconds, recorded out of order.
        for ms in (1..=100).rev() {
            tracker.record(Duration::from_millis(ms));
        }
        let summary = tracker.summary();
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.p50_us, 51_000);
        assert_eq!(summary.p95_us, 96_000);
        assert_eq!(summary.p99_us, 100_000);
        assert_eq!(summary.max_us, 100_000);
    }

    #[test]
    fn single_sample() {
        let tracker = LatencyTracker::new();
        tracker.record(Duration::from_micros(250));
        let summary = tracker.summary();
        assert_eq!(summary.samples, 1);
        assert_eq!(summary.p50_us, 250);
        assert_eq!(summary.max_us, 250);
    }
}

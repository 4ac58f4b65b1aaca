//! End-to-end latency accounting (ingest → flush)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    pub arrival_time: DateTime<Utc>,
    pub flush_time: DateTime<Utc>,
}

impl LatencySample {
    pub fn latency_secs(&self) -> f64 {
        (self.flush_time - self.arrival_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

/// Thread-safe sample sink, independent of the state store's lock
#[derive(Debug, Default)]
pub struct LatencyTracker {
    samples: Mutex<Vec<LatencySample>>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, arrival_time: DateTime<Utc>, flush_time: DateTime<Utc>) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LatencySample { arrival_time, flush_time });
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn samples(&self) -> Vec<LatencySample> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Mean/min/max over all samples, `None` when nothing was flushed
    ///
    /// A flush stamped before the arrival (clock skew) counts as zero.
    pub fn summary(&self) -> Option<LatencySummary> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.is_empty() {
            return None;
        }

        let mut total = 0.0;
        let mut min = f64::INFINITY;
        let mut max = 0.0_f64;
        for sample in samples.iter() {
            let secs = sample.latency_secs();
            total += secs;
            min = min.min(secs);
            max = max.max(secs);
        }

        Some(LatencySummary {
            samples: samples.len(),
            mean_secs: total / samples.len() as f64,
            min_secs: min,
            max_secs: max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_empty_tracker_reports_no_data() {
        let tracker = LatencyTracker::new();
        assert!(tracker.summary().is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_summary_mean_min_max() {
        let tracker = LatencyTracker::new();
        let t0 = Utc.with_ymd_and_hms(2021, 10, 23, 12, 0, 0).unwrap();
        tracker.record(t0, t0 + chrono::Duration::milliseconds(500));
        tracker.record(t0, t0 + chrono::Duration::milliseconds(1500));
        // Skewed sample clamps to zero
        tracker.record(t0, t0 - chrono::Duration::milliseconds(10));

        let summary = tracker.summary().unwrap();
        assert_eq!(summary.samples, 3);
        assert!((summary.mean_secs - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.min_secs, 0.0);
        assert!((summary.max_secs - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_record() {
        let tracker = Arc::new(LatencyTracker::new());
        let t0 = Utc::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        tracker.record(t0, t0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tracker.len(), 1000);
    }
}

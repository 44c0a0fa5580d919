//! Observability for the aggregation service
//!
//! Request counters and aggregation latency, exported as a flat map for
//! Prometheus-style scraping. Safe to share across threads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Core metrics for candle and depth requests.
pub struct AggregationMetrics {
    // Requests
    pub candle_requests: AtomicU64,
    pub depth_requests: AtomicU64,

    // Output
    pub candles_emitted: AtomicU64,
    pub depth_bins_emitted: AtomicU64,

    // Rejections
    pub invalid_inputs: AtomicU64,
    pub empty_results: AtomicU64,

    pub candle_latency_ns: Mutex<LatencyTracker>,
    pub depth_latency_ns: Mutex<LatencyTracker>,
}

impl AggregationMetrics {
    pub fn new(latency_samples: usize) -> Self {
        Self {
            candle_requests: AtomicU64::new(0),
            depth_requests: AtomicU64::new(0),
            candles_emitted: AtomicU64::new(0),
            depth_bins_emitted: AtomicU64::new(0),
            invalid_inputs: AtomicU64::new(0),
            empty_results: AtomicU64::new(0),
            candle_latency_ns: Mutex::new(LatencyTracker::new(latency_samples)),
            depth_latency_ns: Mutex::new(LatencyTracker::new(latency_samples)),
        }
    }

    /// Count an incoming candle request, whatever its outcome.
    pub fn record_candle_request(&self) {
        self.candle_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_depth_request(&self) {
        self.depth_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed candle aggregation.
    pub fn record_candles(&self, emitted: usize, latency_ns: u64) {
        self.candles_emitted.fetch_add(emitted as u64, Ordering::Relaxed);
        if let Ok(mut tracker) = self.candle_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    /// Record a completed depth aggregation.
    pub fn record_depth(&self, bins: usize, latency_ns: u64) {
        self.depth_bins_emitted.fetch_add(bins as u64, Ordering::Relaxed);
        if let Ok(mut tracker) = self.depth_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    pub fn record_invalid_input(&self) {
        self.invalid_inputs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request whose source returned no ticks.
    pub fn record_empty_result(&self) {
        self.empty_results.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("candle_requests".to_string(), self.candle_requests.load(Ordering::Relaxed));
        m.insert("depth_requests".to_string(), self.depth_requests.load(Ordering::Relaxed));
        m.insert("candles_emitted".to_string(), self.candles_emitted.load(Ordering::Relaxed));
        m.insert("depth_bins_emitted".to_string(), self.depth_bins_emitted.load(Ordering::Relaxed));
        m.insert("invalid_inputs".to_string(), self.invalid_inputs.load(Ordering::Relaxed));
        m.insert("empty_results".to_string(), self.empty_results.load(Ordering::Relaxed));
        if let Ok(tracker) = self.candle_latency_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                m.insert("candle_latency_p99_ns".to_string(), p99);
            }
        }
        if let Ok(tracker) = self.depth_latency_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                m.insert("depth_latency_p99_ns".to_string(), p99);
            }
        }
        m
    }
}

impl Default for AggregationMetrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    /// Average latency.
    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

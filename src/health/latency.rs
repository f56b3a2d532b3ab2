//! Recent-latency tracking for health reports.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default number of samples kept per resource.
pub const DEFAULT_WINDOW: usize = 64;

/// Summary of the samples currently in the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub last_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

/// Fixed-size window of the most recent call durations.
#[derive(Debug)]
pub struct LatencyWindow {
    capacity: usize,
    samples: Mutex<VecDeque<Duration>>,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, took: Duration) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(took);
    }

    pub fn summary(&self) -> LatencySummary {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.is_empty() {
            return LatencySummary::default();
        }
        let to_ms = |d: &Duration| d.as_micros() as f64 / 1000.0;
        let total: f64 = samples.iter().map(to_ms).sum();
        LatencySummary {
            samples: samples.len(),
            last_ms: samples.back().map(to_ms),
            avg_ms: Some(total / samples.len() as f64),
            max_ms: samples.iter().map(to_ms).reduce(f64::max),
        }
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

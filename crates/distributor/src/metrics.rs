//! Per-sink pull metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one sink's pull worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Demand signals received
    demand_count: AtomicU64,
    /// Frames handed downstream successfully
    forward_count: AtomicU64,
    /// Demands that found the slot empty
    empty_count: AtomicU64,
    /// Forwards of a frame already forwarded once (Peek policy)
    repeat_count: AtomicU64,
    /// Forward failures, fatal or not
    failure_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn demand_count(&self) -> u64 {
        self.demand_count.load(Ordering::Relaxed)
    }

    pub fn inc_demand_count(&self) {
        self.demand_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forward_count(&self) -> u64 {
        self.forward_count.load(Ordering::Relaxed)
    }

    pub fn inc_forward_count(&self) {
        self.forward_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn empty_count(&self) -> u64 {
        self.empty_count.load(Ordering::Relaxed)
    }

    pub fn inc_empty_count(&self) {
        self.empty_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn repeat_count(&self) -> u64 {
        self.repeat_count.load(Ordering::Relaxed)
    }

    pub fn inc_repeat_count(&self) {
        self.repeat_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            demand_count: self.demand_count(),
            forward_count: self.forward_count(),
            empty_count: self.empty_count(),
            repeat_count: self.repeat_count(),
            failure_count: self.failure_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub demand_count: u64,
    pub forward_count: u64,
    pub empty_count: u64,
    pub repeat_count: u64,
    pub failure_count: u64,
}

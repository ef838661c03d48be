//! Metrics Collection
//!
//! Counters for the health scheduler. Snapshots are logged as JSON at the
//! end of every cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the registry
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Completed scheduler cycles
    pub cycles: AtomicU64,

    /// Cycles that ran longer than the check interval
    pub cycles_overrun: AtomicU64,

    /// Probes handed to the worker pool
    pub probes_dispatched: AtomicU64,

    /// Probes that reached the peer
    pub probes_succeeded: AtomicU64,

    /// Probes that timed out or were refused
    pub probes_failed: AtomicU64,

    /// Nodes created by a first confirmation
    pub nodes_discovered: AtomicU64,

    /// Store operations that failed during a cycle
    pub store_errors: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_cycles(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_overrun(&self) {
        self.cycles_overrun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_probes_dispatched(&self) {
        self.probes_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_probes_succeeded(&self) {
        self.probes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_probes_failed(&self) {
        self.probes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_nodes_discovered(&self) {
        self.nodes_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_store_errors(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "cycles": {
                "completed": self.cycles.load(Ordering::Relaxed),
                "overrun": self.cycles_overrun.load(Ordering::Relaxed),
            },
            "probes": {
                "dispatched": self.probes_dispatched.load(Ordering::Relaxed),
                "succeeded": self.probes_succeeded.load(Ordering::Relaxed),
                "failed": self.probes_failed.load(Ordering::Relaxed),
            },
            "nodes_discovered": self.nodes_discovered.load(Ordering::Relaxed),
            "store_errors": self.store_errors.load(Ordering::Relaxed),
        })
    }
}

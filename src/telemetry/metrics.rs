//! Metrics collection for NAT table activity.
//!
//! Thread-safe counters and gauges updated by the table on its hot path,
//! readable by the owner without taking the table lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters and gauges describing NAT table activity.
#[derive(Debug, Default)]
pub struct NatMetrics {
    /// Records inserted.
    pub insertions: Counter,
    /// Records removed for any reason.
    pub removals: Counter,
    /// Removals caused by idle timeout.
    pub evictions: Counter,
    /// Inserts rejected because a key was already mapped.
    pub conflicts: Counter,
    /// Inserts that failed with an exhausted id space.
    pub exhausted: Counter,
    /// Inbound resolutions that found a mapping.
    pub resolve_hits: Counter,
    /// Inbound resolutions that missed.
    pub resolve_misses: Counter,
    /// Current number of live records.
    entries: AtomicU64,
}

impl NatMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the live-record gauge.
    pub fn set_entries(&self, count: usize) {
        self.entries.store(count as u64, Ordering::Relaxed);
    }

    /// Current number of live records.
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        vec![
            ("nat_insertions".into(), self.insertions.get()),
            ("nat_removals".into(), self.removals.get()),
            ("nat_evictions".into(), self.evictions.get()),
            ("nat_conflicts".into(), self.conflicts.get()),
            ("nat_exhausted".into(), self.exhausted.get()),
            ("nat_resolve_hits".into(), self.resolve_hits.get()),
            ("nat_resolve_misses".into(), self.resolve_misses.get()),
            ("nat_entries".into(), self.entries()),
        ]
    }
}

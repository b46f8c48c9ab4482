//! Warnings, counters and the progress/cancellation port.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Stable warning category keys. Warning counts are reported under these
/// keys in [`crate::core::RunSummary::warnings`].
pub mod categories {
    /// A required input structure was absent.
    pub const MISSING_INPUT: &str = "missing-input";
    /// A product structure failed sanitization and was skipped.
    pub const SANITIZE_FAILED: &str = "sanitize-failed";
    /// Paired mode over streams of unequal length.
    pub const LENGTH_MISMATCH: &str = "length-mismatch";
    /// An input stream was empty; there were no reactants to process.
    pub const EMPTY_INPUT: &str = "empty-input";
}

/// Concurrent warning aggregator keyed by stable category.
///
/// Domain conditions are never fatal; every skipped row or product
/// increments a counter here so nothing is dropped silently.
pub struct WarningSink {
    counts: Mutex<HashMap<String, u64>>,
}

impl WarningSink {
    pub fn new() -> Self {
        WarningSink { counts: Mutex::new(HashMap::new()) }
    }

    /// Counts one occurrence of the category.
    pub fn record(&self, category: &str) {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Records the category only if it has not been seen yet.
    pub fn record_once(&self, category: &str) {
        let mut counts = self.counts.lock().unwrap();
        counts.entry(category.to_string()).or_insert(1);
    }

    pub fn count(&self, category: &str) -> u64 {
        self.counts.lock().unwrap().get(category).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.lock().unwrap().clone()
    }
}

impl Default for WarningSink {
    fn default() -> Self {
        WarningSink::new()
    }
}

/// Atomic counters shared by all workers of a run.
pub struct RunCounters {
    products_emitted: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        RunCounters { products_emitted: AtomicU64::new(0) }
    }

    pub fn increment_products(&self) {
        self.products_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn products_emitted(&self) -> u64 {
        self.products_emitted.load(Ordering::Relaxed)
    }
}

impl Default for RunCounters {
    fn default() -> Self {
        RunCounters::new()
    }
}

/// Progress reporting and cooperative cancellation port.
///
/// Cancellation is polled at a bounded cadence, never preemptive: an
/// already-running unit of work runs to completion.
pub trait ProgressPort: Send + Sync {
    fn report_progress(&self, _done: u64, _total: Option<u64>, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Port that never cancels and swallows progress.
pub struct NullProgress;

impl ProgressPort for NullProgress {}

/// Flag-backed port, for wiring external stop signals (Ctrl-C, a host
/// application's cancel button) into a run.
#[derive(Clone)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Wraps an existing flag, e.g. one owned by a signal handler.
    pub fn from_flag(cancelled: Arc<AtomicBool>) -> Self {
        CancelFlag { cancelled }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        CancelFlag::new()
    }
}

impl ProgressPort for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

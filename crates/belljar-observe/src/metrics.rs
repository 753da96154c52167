//! Metrics collection over a session's lifetime.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Collects per-session execution metrics.
///
/// Shared between the session and its dispatcher; all recording methods take
/// `&self` so the collector can sit behind an `Arc` without extra locking at
/// the call sites.
#[derive(Default)]
pub struct MetricsCollector {
    runs: RwLock<RunMetrics>,
    invokes: RwLock<InvokeMetrics>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run.
    pub fn record_run(&self, success: bool, duration: Duration) {
        let mut runs = self.runs.write();
        runs.total += 1;
        if !success {
            runs.failed += 1;
        }
        runs.total_duration += duration;
    }

    /// Record a capability invocation.
    pub fn record_invoke(&self, name: &str, duration: Duration) {
        let mut invokes = self.invokes.write();
        invokes.total += 1;
        *invokes.call_counts.entry(name.to_string()).or_insert(0) += 1;
        *invokes
            .call_durations
            .entry(name.to_string())
            .or_insert(Duration::ZERO) += duration;
    }

    /// Record an invoke that named no table entry.
    pub fn record_unknown_token(&self) {
        self.invokes.write().unknown_tokens += 1;
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs.read().clone(),
            invokes: self.invokes.read().clone(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        *self.runs.write() = RunMetrics::default();
        *self.invokes.write() = InvokeMetrics::default();
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("runs", &*self.runs.read())
            .field("invokes", &*self.invokes.read())
            .finish()
    }
}

/// Snapshot of collected metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Run metrics.
    pub runs: RunMetrics,
    /// Invocation metrics.
    pub invokes: InvokeMetrics,
}

/// Metrics about submitted runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Runs submitted.
    pub total: u64,
    /// Runs that ended in any failure class.
    pub failed: u64,
    /// Summed wall-clock time of all runs.
    pub total_duration: Duration,
}

/// Metrics about capability invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeMetrics {
    /// Invocations dispatched.
    pub total: u64,
    /// Invocations naming no table entry.
    pub unknown_tokens: u64,
    /// Per-capability call counts, keyed by dotted path.
    pub call_counts: HashMap<String, u64>,
    /// Per-capability summed dispatch durations.
    pub call_durations: HashMap<String, Duration>,
}

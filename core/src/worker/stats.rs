//! Worker bookkeeping

use std::time::Instant;

/// Per-worker invocation counts
///
/// Only `completed` and `errors` reached the statistics calculator; the
/// discarded counts track samples that fell outside the measured window.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Measured successful invocations
    pub completed: usize,

    /// Measured failed invocations
    pub errors: usize,

    /// Invocations started during warm-up
    pub warm_up_discarded: usize,

    /// Invocations that finished after the run deadline
    pub late_discarded: usize,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Measured invocations (completed + errors)
    pub fn measured(&self) -> usize {
        self.completed + self.errors
    }

    /// Every invocation this worker ran, measured or not
    pub fn total_invocations(&self) -> usize {
        self.measured() + self.warm_up_discarded + self.late_discarded
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Record a measured success
    pub fn record_success(&mut self) {
        self.completed += 1;
    }

    /// Record a measured failure
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Merge stats from another worker
    pub fn merge(&mut self, other: &WorkerStats) {
        self.completed += other.completed;
        self.errors += other.errors;
        self.warm_up_discarded += other.warm_up_discarded;
        self.late_discarded += other.late_discarded;
    }
}

//! Run bookkeeping aggregated from every worker

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::worker::WorkerStats;

/// What the workers of one evaluation did, measured or not
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Workers spawned
    pub workers: usize,

    /// Invocations run by workers that reported back
    pub invocations: usize,

    /// Invocations that reached the statistics calculator
    pub measured: usize,

    /// Invocations started during warm-up
    pub warm_up_discarded: usize,

    /// Invocations that finished after the deadline
    pub late_discarded: usize,

    /// Workers still busy when the drain grace ran out
    pub abandoned_workers: usize,

    /// Worker tasks that died instead of reporting
    pub worker_failures: usize,

    /// Wall time from context creation to the end of draining
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Whether every worker stopped on its own
    pub fn drained_cleanly(&self) -> bool {
        self.abandoned_workers == 0 && self.worker_failures == 0
    }
}

/// Fold per-worker stats into a run summary
///
/// `workers` counts every spawned worker, including those that never
/// reported (abandoned or failed), so it can exceed `stats.len()`.
pub fn aggregate_worker_stats(
    stats: &[WorkerStats],
    workers: usize,
    abandoned_workers: usize,
    worker_failures: usize,
    elapsed: Duration,
) -> RunSummary {
    let mut total = WorkerStats::new();
    for s in stats {
        total.merge(s);
    }

    RunSummary {
        workers,
        invocations: total.total_invocations(),
        measured: total.measured(),
        warm_up_discarded: total.warm_up_discarded,
        late_discarded: total.late_discarded,
        abandoned_workers,
        worker_failures,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

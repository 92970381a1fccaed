//! Warm-up / measurement boundary shared by every worker

use std::time::{Duration, Instant};

/// Where a finished invocation falls relative to the measured window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePhase {
    /// Started before measurement began; discarded
    WarmUp,
    /// Started and finished inside the window; recorded
    Measured,
    /// Finished after the deadline; discarded
    Late,
}

/// The measured window of one evaluation
///
/// Computed once before any worker is spawned and copied into each of them,
/// so every worker compares against the same immutable boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementWindow {
    start: Instant,
    end: Instant,
}

impl MeasurementWindow {
    /// Window opening `warm_up` after `origin` and lasting `duration`
    pub fn new(origin: Instant, warm_up: Duration, duration: Duration) -> Self {
        let start = origin + warm_up;
        Self {
            start,
            end: start + duration,
        }
    }

    /// When measured recording begins
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Run deadline
    pub fn end(&self) -> Instant {
        self.end
    }

    /// Whether the deadline has passed
    pub fn is_over(&self) -> bool {
        Instant::now() >= self.end
    }

    /// Time left before the deadline, counted from `from`
    pub fn remaining(&self, from: Instant) -> Duration {
        self.end.saturating_duration_since(from)
    }

    /// Measured time elapsed up to `at`, clamped to the window
    pub fn measured_until(&self, at: Instant) -> Duration {
        at.min(self.end).saturating_duration_since(self.start)
    }

    /// Classify an invocation by its start and finish instants
    pub fn classify(&self, started: Instant, finished: Instant) -> SamplePhase {
        if started < self.start {
            SamplePhase::WarmUp
        } else if finished > self.end {
            SamplePhase::Late
        } else {
            SamplePhase::Measured
        }
    }
}

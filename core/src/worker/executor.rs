//! Worker execution loop

use crate::invocation::{InvocationError, InvocationHandle};
use crate::traits::StatisticsCalculator;

use super::rate_limiter::RateController;
use super::stats::WorkerStats;
use super::window::{MeasurementWindow, SamplePhase};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Worker invokes the test body in a loop: permit -> invoke -> record -> repeat
///
/// Workers are tokio tasks owned by the scheduler. They share the invocation,
/// the statistics calculator and the rate controller via Arc. Failures of the
/// test body end up as error samples and never stop the loop.
pub struct Worker {
    /// Unique worker identifier
    id: usize,

    /// Test body (shared across workers)
    invocation: InvocationHandle,

    /// Sample sink (shared across workers)
    statistics: Arc<dyn StatisticsCalculator>,

    /// Global rate ceiling (shared across workers)
    rate_controller: Arc<RateController>,

    /// Warm-up boundary and deadline
    window: MeasurementWindow,

    /// Per-invocation timeout
    invocation_timeout: Option<Duration>,
}

impl Worker {
    /// Create a new worker
    pub fn new(
        id: usize,
        invocation: InvocationHandle,
        statistics: Arc<dyn StatisticsCalculator>,
        rate_controller: Arc<RateController>,
        window: MeasurementWindow,
        invocation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            invocation,
            statistics,
            rate_controller,
            window,
            invocation_timeout,
        }
    }

    /// Run the worker loop
    ///
    /// Returns when the deadline passes or a shutdown signal arrives. The
    /// signal is only observed between invocations: an invocation in flight
    /// always runs to completion (or to its timeout).
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> WorkerStats {
        let mut stats = WorkerStats::new();
        stats.start();

        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            if self.window.is_over() || shutdown_requested(&mut shutdown) {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!(worker_id = self.id, "Worker received shutdown signal");
                    break;
                }

                permitted = self.rate_controller.acquire_until(self.window.end()) => {
                    if !permitted {
                        break;
                    }
                }
            }

            self.invoke_once(&mut stats).await;
        }

        stats.stop();
        tracing::debug!(
            worker_id = self.id,
            completed = stats.completed,
            errors = stats.errors,
            warm_up_discarded = stats.warm_up_discarded,
            late_discarded = stats.late_discarded,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        stats
    }

    /// Run the test body once and file the sample
    async fn invoke_once(&self, stats: &mut WorkerStats) {
        let started = Instant::now();
        let (timeout, cut_at_deadline) = self.effective_timeout(started);
        let outcome = self.invocation.execute(timeout).await;
        let finished = Instant::now();

        let phase = match self.window.classify(started, finished) {
            // timed out by the deadline itself, not by the body
            SamplePhase::Late
                if cut_at_deadline
                    && matches!(outcome.result, Err(InvocationError::TimedOut(_))) =>
            {
                SamplePhase::Measured
            }
            phase => phase,
        };

        match phase {
            SamplePhase::WarmUp => stats.warm_up_discarded += 1,
            SamplePhase::Late => stats.late_discarded += 1,
            SamplePhase::Measured => {
                self.statistics.record(outcome.latency, outcome.is_error());
                match outcome.result {
                    Ok(()) => stats.record_success(),
                    Err(e) => {
                        stats.record_error();
                        tracing::trace!(worker_id = self.id, error = %e, "Invocation failed");
                    }
                }
            }
        }
    }

    /// Configured timeout, capped at the time left before the deadline
    ///
    /// The flag is set when the deadline is the binding limit.
    fn effective_timeout(&self, started: Instant) -> (Option<Duration>, bool) {
        let remaining = self.window.remaining(started);
        match self.invocation_timeout {
            Some(timeout) if !remaining.is_zero() && remaining <= timeout => {
                (Some(remaining), true)
            }
            timeout => (timeout, false),
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Non-blocking check of the shutdown channel
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("invocation", &self.invocation)
            .field("statistics", &self.statistics.name())
            .field("rate_controller", &self.rate_controller)
            .field("window", &self.window)
            .finish()
    }
}

//! Scheduler execution logic

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::EvaluationConfig;
use crate::context::EvaluationContext;
use crate::error::{Error, Result};
use crate::invocation::InvocationHandle;
use crate::statistics::DEFAULT_PERCENTILES;
use crate::thresholds::evaluate_thresholds;
use crate::traits::StatisticsCalculator;
use crate::worker::{MeasurementWindow, RateController, WorkerBuilder, WorkerStats};

use super::aggregator::aggregate_worker_stats;

/// EvaluationScheduler runs one performance evaluation of a test body
///
/// Responsible for spawning workers, publishing the measurement start,
/// coordinating shutdown and turning the recorded samples into a finalized
/// [`EvaluationContext`]. Each scheduler evaluates exactly once.
pub struct EvaluationScheduler {
    /// Test identity
    test_name: String,

    /// Owning class identity
    group: String,

    /// Validated run configuration
    config: EvaluationConfig,

    /// Sample sink shared by every worker
    statistics: Arc<dyn StatisticsCalculator>,

    /// Global rate ceiling shared by every worker
    rate_controller: Arc<RateController>,

    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,

    /// Sticky stop request, seen even if it arrives before anyone subscribes
    stop_requested: Arc<AtomicBool>,

    /// Set by the first call to `evaluate`
    evaluated: AtomicBool,
}

impl EvaluationScheduler {
    /// Create a new scheduler
    ///
    /// Use `SchedulerBuilder` to get a validated configuration.
    pub fn new(
        test_name: String,
        group: String,
        config: EvaluationConfig,
        statistics: Arc<dyn StatisticsCalculator>,
    ) -> Self {
        let rate_controller = Arc::new(match config.rate_limit() {
            Some(rate) => RateController::new(rate),
            None => RateController::unlimited(),
        });
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            test_name,
            group,
            config,
            statistics,
            rate_controller,
            shutdown_tx,
            stop_requested: Arc::new(AtomicBool::new(false)),
            evaluated: AtomicBool::new(false),
        }
    }

    /// Test identity
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Run configuration
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Whether `evaluate` has been called
    pub fn is_evaluated(&self) -> bool {
        self.evaluated.load(Ordering::SeqCst)
    }

    /// Stop the run early
    ///
    /// Workers finish their current invocation and exit; whatever was
    /// measured so far is still snapshotted and checked. A call made before
    /// `evaluate` makes it stop right after spawning its workers.
    pub fn shutdown(&self) {
        request_stop(&self.stop_requested, &self.shutdown_tx);
    }

    /// Run the evaluation
    ///
    /// Returns the finalized context. Threshold violations are part of the
    /// context, not an error: call [`EvaluationContext::verdict`] for that.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyEvaluated` on any call after the first.
    pub async fn evaluate(&self, invocation: InvocationHandle) -> Result<EvaluationContext> {
        if self.evaluated.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyEvaluated(self.test_name.clone()));
        }

        let mut context = EvaluationContext::new(
            self.test_name.clone(),
            self.group.clone(),
            self.config.clone(),
            invocation.is_async(),
        );
        let window = MeasurementWindow::new(
            context.created_instant(),
            self.config.warm_up(),
            self.config.duration(),
        );
        let invocation_timeout = self.invocation_timeout(&invocation);

        tracing::info!(
            test = %self.test_name,
            group = %self.group,
            threads = self.config.threads,
            duration_ms = self.config.duration_ms,
            warm_up_ms = self.config.warm_up_ms,
            rate_limit = ?self.config.rate_limit(),
            invocation = ?invocation,
            statistics = self.statistics.name(),
            "Starting evaluation"
        );

        // Subscribe before spawning so an early shutdown is never missed
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let mut handles = Vec::with_capacity(self.config.threads);
        for worker_id in 0..self.config.threads {
            let worker = WorkerBuilder::new(worker_id)
                .invocation(invocation.clone())
                .statistics(Arc::clone(&self.statistics))
                .rate_controller(Arc::clone(&self.rate_controller))
                .window(window)
                .invocation_timeout(invocation_timeout)
                .build()?;
            let worker_shutdown = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move { worker.run(worker_shutdown).await }));
        }

        let mut stopped_early = self.stop_requested.load(Ordering::SeqCst);
        if !stopped_early {
            stopped_early = tokio::select! {
                _ = shutdown_rx.recv() => true,
                _ = tokio::time::sleep_until(window.start().into()) => false,
            };
        }

        if !stopped_early {
            let earliest = context.created_at().timestamp_millis() + self.config.warm_up_ms as i64;
            context.mark_measurements_started(Utc::now().timestamp_millis().max(earliest));
            tracing::debug!(test = %self.test_name, "Warm-up finished, measuring");

            stopped_early = tokio::select! {
                _ = shutdown_rx.recv() => true,
                _ = tokio::time::sleep_until(window.end().into()) => false,
            };
        }

        let stopped_at = Instant::now();
        if stopped_early {
            tracing::info!(test = %self.test_name, "Evaluation stopped before its deadline");
        }
        self.shutdown();

        let (results, abandoned, failures) = self.drain(handles).await;
        let summary = aggregate_worker_stats(
            &results,
            self.config.threads,
            abandoned,
            failures,
            context.created_instant().elapsed(),
        );

        let statistics = self
            .statistics
            .snapshot(window.measured_until(stopped_at), &self.percentiles());
        let violations = evaluate_thresholds(&self.config.thresholds, &statistics);

        for violation in &violations {
            tracing::warn!(test = %self.test_name, %violation, "Threshold violated");
        }

        tracing::info!(
            test = %self.test_name,
            total = statistics.total_count,
            errors = statistics.error_count,
            error_percentage = statistics.error_percentage,
            throughput = statistics.throughput,
            warm_up_discarded = summary.warm_up_discarded,
            late_discarded = summary.late_discarded,
            abandoned_workers = summary.abandoned_workers,
            passed = violations.is_empty(),
            "Evaluation completed"
        );

        context.finalize(statistics, summary, violations);
        Ok(context)
    }

    /// Run with Ctrl+C signal handling
    ///
    /// Ctrl+C ends the run early instead of killing the process, so the
    /// partial results still get reported.
    pub async fn evaluate_with_signal_handling(
        &self,
        invocation: InvocationHandle,
    ) -> Result<EvaluationContext> {
        let shutdown_tx = self.shutdown_tx.clone();
        let stop_requested = Arc::clone(&self.stop_requested);

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, stopping evaluation...");
                    request_stop(&stop_requested, &shutdown_tx);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.evaluate(invocation).await;
        signal_handle.abort();

        result
    }

    /// Wait for workers up to the drain grace, aborting whoever is left
    async fn drain(
        &self,
        handles: Vec<JoinHandle<WorkerStats>>,
    ) -> (Vec<WorkerStats>, usize, usize) {
        let grace_deadline = tokio::time::Instant::now() + self.config.drain_grace();
        let mut results = Vec::with_capacity(handles.len());
        let mut abandoned = 0;
        let mut failures = 0;

        for (idx, mut handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout_at(grace_deadline, &mut handle).await {
                Ok(Ok(stats)) => results.push(stats),
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::error!(worker_id = idx, error = %e, "Worker task failed");
                }
                Err(_) => {
                    handle.abort();
                    abandoned += 1;
                    tracing::warn!(worker_id = idx, "Worker still busy after drain grace, aborted");
                }
            }
        }

        (results, abandoned, failures)
    }

    /// Per-invocation timeout; completion-style bodies always get one
    fn invocation_timeout(&self, invocation: &InvocationHandle) -> Option<Duration> {
        self.config
            .invocation_timeout()
            .or_else(|| invocation.is_async().then(|| self.config.duration()))
    }

    /// Default percentiles plus any a threshold asks for
    fn percentiles(&self) -> Vec<u8> {
        DEFAULT_PERCENTILES
            .iter()
            .copied()
            .chain(self.config.thresholds.max_latency_percentiles.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Raise the sticky flag before broadcasting, so a late subscriber still sees it
fn request_stop(stop_requested: &AtomicBool, shutdown_tx: &broadcast::Sender<()>) {
    stop_requested.store(true, Ordering::SeqCst);
    let _ = shutdown_tx.send(());
}

impl std::fmt::Debug for EvaluationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationScheduler")
            .field("test_name", &self.test_name)
            .field("group", &self.group)
            .field("config", &self.config)
            .field("statistics", &self.statistics.name())
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}

//! Evaluation context: configuration, run state and final results of one run

use crate::config::EvaluationConfig;
use crate::error::{Error, Result};
use crate::scheduler::RunSummary;
use crate::statistics::Statistics;
use crate::thresholds::ThresholdViolation;
use chrono::{DateTime, Utc};
use std::sync::OnceLock;
use std::time::Instant;

/// One run's configuration, live state and final statistics
///
/// Created by the scheduler at the start of an evaluation and finalized once
/// the run is over. Never reused across runs.
#[derive(Debug)]
pub struct EvaluationContext {
    test_name: String,
    group: String,
    config: EvaluationConfig,
    created_at: DateTime<Utc>,
    created_instant: Instant,
    measurements_start_time_ms: OnceLock<i64>,
    is_async_evaluation: bool,
    statistics: Option<Statistics>,
    run_summary: Option<RunSummary>,
    violations: Vec<ThresholdViolation>,
}

impl EvaluationContext {
    /// Create a fresh context
    pub fn new(
        test_name: impl Into<String>,
        group: impl Into<String>,
        config: EvaluationConfig,
        is_async_evaluation: bool,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            group: group.into(),
            config,
            created_at: Utc::now(),
            created_instant: Instant::now(),
            measurements_start_time_ms: OnceLock::new(),
            is_async_evaluation,
            statistics: None,
            run_summary: None,
            violations: Vec::new(),
        }
    }

    /// Test name
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Owning class identity
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Run configuration
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Wall-clock creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn created_instant(&self) -> Instant {
        self.created_instant
    }

    /// Epoch milliseconds at which measured recording began
    pub fn measurements_start_time_ms(&self) -> Option<i64> {
        self.measurements_start_time_ms.get().copied()
    }

    /// Publish the start of measured recording
    ///
    /// Only the first call has an effect; returns whether it was this one.
    pub fn mark_measurements_started(&self, epoch_ms: i64) -> bool {
        self.measurements_start_time_ms.set(epoch_ms).is_ok()
    }

    /// Whether the test body signals completion out of band
    pub fn is_async_evaluation(&self) -> bool {
        self.is_async_evaluation
    }

    /// Final statistics, once finalized
    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    /// Worker bookkeeping, once finalized
    pub fn run_summary(&self) -> Option<&RunSummary> {
        self.run_summary.as_ref()
    }

    /// Violated thresholds (empty = pass)
    pub fn violations(&self) -> &[ThresholdViolation] {
        &self.violations
    }

    /// Whether the run has been finalized
    pub fn is_finalized(&self) -> bool {
        self.statistics.is_some()
    }

    /// Whether the run finished and met every threshold
    pub fn passed(&self) -> bool {
        self.is_finalized() && self.violations.is_empty()
    }

    /// Translate the violations into a result the host can propagate
    pub fn verdict(&self) -> Result<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ThresholdsNotMet(self.violations.clone()))
        }
    }

    pub(crate) fn finalize(
        &mut self,
        statistics: Statistics,
        run_summary: RunSummary,
        violations: Vec<ThresholdViolation>,
    ) {
        self.statistics = Some(statistics);
        self.run_summary = Some(run_summary);
        self.violations = violations;
    }
}

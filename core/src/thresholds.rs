//! Threshold evaluation: statistics snapshot in, violations out

use crate::config::Thresholds;
use crate::statistics::Statistics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a bound was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    /// The observed value must not exceed the threshold
    Upper,
    /// The observed value must not fall below the threshold
    Lower,
}

/// One violated threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdViolation {
    /// Metric name, e.g. `error_percentage` or `latency_p95_ms`
    pub metric: String,
    /// Bound direction
    pub limit: Limit,
    /// Configured bound
    pub threshold: f64,
    /// Value measured by the run
    pub observed: f64,
}

impl ThresholdViolation {
    /// Create a violation record
    pub fn new(metric: impl Into<String>, limit: Limit, threshold: f64, observed: f64) -> Self {
        Self {
            metric: metric.into(),
            limit,
            threshold,
            observed,
        }
    }
}

impl fmt::Display for ThresholdViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            Limit::Upper => write!(
                f,
                "{} observed {:.3}, above maximum {:.3}",
                self.metric, self.observed, self.threshold
            ),
            Limit::Lower => write!(
                f,
                "{} observed {:.3}, below minimum {:.3}",
                self.metric, self.observed, self.threshold
            ),
        }
    }
}

/// Compare a snapshot against every configured bound
///
/// Returns all violations, in a fixed order: error percentage, throughput,
/// min / max / mean latency, then percentiles ascending. Empty means pass.
pub fn evaluate_thresholds(thresholds: &Thresholds, stats: &Statistics) -> Vec<ThresholdViolation> {
    let mut violations = Vec::new();

    let mut check = |metric: String, limit: Limit, bound: Option<f64>, observed: f64| {
        let Some(threshold) = bound else {
            return;
        };
        let violated = match limit {
            Limit::Upper => observed > threshold,
            Limit::Lower => observed < threshold,
        };
        if violated {
            violations.push(ThresholdViolation::new(metric, limit, threshold, observed));
        }
    };

    check(
        "error_percentage".into(),
        Limit::Upper,
        thresholds.max_error_percentage,
        stats.error_percentage,
    );
    check(
        "throughput".into(),
        Limit::Lower,
        thresholds.min_throughput,
        stats.throughput,
    );
    check(
        "min_latency_ms".into(),
        Limit::Lower,
        thresholds.min_latency_ms,
        stats.min_latency_ms,
    );
    check(
        "max_latency_ms".into(),
        Limit::Upper,
        thresholds.max_latency_ms,
        stats.max_latency_ms,
    );
    check(
        "mean_latency_ms".into(),
        Limit::Upper,
        thresholds.mean_latency_ms,
        stats.mean_latency_ms,
    );

    for (&percentile, &bound) in &thresholds.max_latency_percentiles {
        // A calculator that skipped a requested percentile cannot prove the bound holds
        let observed = stats.latency_percentile(percentile).unwrap_or(f64::INFINITY);
        check(
            format!("latency_p{percentile}_ms"),
            Limit::Upper,
            Some(bound),
            observed,
        );
    }

    violations
}

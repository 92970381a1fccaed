//! loadgauge-core: Evaluation engine for per-test performance checks
//!
//! This crate runs a test body repeatedly and concurrently for a bounded
//! duration and turns the outcome into a pass/fail verdict:
//!
//! - Scheduling: worker tasks, warm-up, deadline and drain (`scheduler`, `worker`)
//! - Rate control shared by every worker (`RateController`)
//! - Statistics aggregation and threshold checks
//! - Per-class registration and reporting (`registry`, `reporting`, `harness`)
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod harness;
pub mod invocation;
pub mod registry;
pub mod reporting;
pub mod scheduler;
pub mod statistics;
pub mod thresholds;
pub mod traits;
pub mod worker;

pub use config::{parse_percentiles, ConfigError, EvaluationConfig, Thresholds};
pub use context::EvaluationContext;
pub use error::*;
pub use harness::TestClassHarness;
pub use invocation::{Completion, CompletionHandle, InvocationError, InvocationHandle, Outcome};
pub use registry::ActiveContextRegistry;
pub use reporting::{
    default_statistics_supplier, resolve_reporting, LogReportSink, ReportingConfig,
    ResolvedReporting, StatisticsSupplier,
};
pub use scheduler::{EvaluationScheduler, RunSummary, SchedulerBuilder};
pub use statistics::{DescriptiveStatistics, Statistics, DEFAULT_PERCENTILES};
pub use thresholds::{evaluate_thresholds, Limit, ThresholdViolation};
pub use traits::*;
pub use worker::{RateController, WorkerBuilder, WorkerStats};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    // =========================================================================
    // Serialization format tests
    // =========================================================================

    #[test]
    fn test_config_json_defaults() {
        let config: EvaluationConfig = serde_json::from_str(r#"{"threads": 4}"#).unwrap();
        assert_eq!(config.threads, 4);
        assert_eq!(config.warm_up_ms, 0);
        assert_eq!(config.max_executions_per_second, 0);
        assert!(config.thresholds.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_violation_json_format() {
        let violation = ThresholdViolation::new("latency_p95_ms", Limit::Upper, 7.5, 9.25);
        let json = serde_json::to_string(&violation).unwrap();

        assert!(json.contains("\"metric\":\"latency_p95_ms\""));
        assert!(json.contains("\"limit\":\"upper\""));
    }

    #[test]
    fn test_statistics_percentiles_serialize_as_map() {
        let mut stats = Statistics::default();
        stats.percentiles.insert(95, 7.0);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["percentiles"]["95"], 7.0);
    }

    // =========================================================================
    // End-to-end
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_class_run_end_to_end() {
        let registry = Arc::new(ActiveContextRegistry::new());
        let harness = TestClassHarness::new("EndToEnd", Arc::clone(&registry), &[]).unwrap();

        let thresholds = Thresholds::new()
            .with_max_error_percentage(0.0)
            .with_max_latency_percentile(99, 1_000.0);
        let config = EvaluationConfig::new(2)
            .with_duration_ms(150)
            .with_warm_up_ms(20)
            .with_thresholds(thresholds);

        let context = harness
            .run_test(
                "fast_path",
                Some(&config),
                InvocationHandle::from_fn(|| async { Ok::<(), InvocationError>(()) }),
            )
            .await
            .unwrap()
            .unwrap();

        assert!(context.verdict().is_ok());
        assert!(harness.finish().is_ok());
        assert_eq!(registry.groups(), vec!["EndToEnd"]);
    }
}

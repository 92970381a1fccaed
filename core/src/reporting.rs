//! Reporting configuration resolution and the built-in log sink
//!
//! A test class may carry several [`ReportingConfig`] candidates; only those
//! marked active are honored, and at most one may be. With none, the class
//! reports through [`LogReportSink`] and measures with
//! [`DescriptiveStatistics`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::statistics::DescriptiveStatistics;
use crate::traits::{ReportSink, StatisticsCalculator};

/// Zero-argument factory returning a fresh aggregator per test
pub type StatisticsSupplier = Arc<dyn Fn() -> Arc<dyn StatisticsCalculator> + Send + Sync>;

/// Supplier of the default [`DescriptiveStatistics`] calculator
pub fn default_statistics_supplier() -> StatisticsSupplier {
    Arc::new(|| Arc::new(DescriptiveStatistics::new()) as Arc<dyn StatisticsCalculator>)
}

/// One reporting override candidate for a test class
#[derive(Clone, Default)]
pub struct ReportingConfig {
    active: bool,
    report_sinks: Vec<Arc<dyn ReportSink>>,
    statistics_supplier: Option<StatisticsSupplier>,
}

impl ReportingConfig {
    /// Create an inactive, empty candidate
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this candidate as the one to honor
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Add a report sink
    pub fn report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sinks.push(sink);
        self
    }

    /// Override the statistics calculator factory
    pub fn statistics_supplier(mut self, supplier: StatisticsSupplier) -> Self {
        self.statistics_supplier = Some(supplier);
        self
    }

    /// Whether this candidate is honored
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl std::fmt::Debug for ReportingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sinks: Vec<&str> = self.report_sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("ReportingConfig")
            .field("active", &self.active)
            .field("report_sinks", &sinks)
            .field("statistics_supplier", &self.statistics_supplier.is_some())
            .finish()
    }
}

/// Reporting setup a test class runs with
#[derive(Clone)]
pub struct ResolvedReporting {
    /// Sinks handed every context of the class
    pub report_sinks: Vec<Arc<dyn ReportSink>>,
    /// Factory for each evaluated test's calculator
    pub statistics_supplier: StatisticsSupplier,
}

impl Default for ResolvedReporting {
    fn default() -> Self {
        Self {
            report_sinks: vec![Arc::new(LogReportSink)],
            statistics_supplier: default_statistics_supplier(),
        }
    }
}

impl std::fmt::Debug for ResolvedReporting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sinks: Vec<&str> = self.report_sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("ResolvedReporting")
            .field("report_sinks", &sinks)
            .finish_non_exhaustive()
    }
}

/// Pick the reporting setup for a class from its candidates
///
/// Inactive candidates are ignored. An active candidate without sinks keeps
/// the default sink, and one without a supplier keeps the default calculator.
///
/// # Errors
///
/// Returns `ConfigError::MultipleActiveReporting` when more than one
/// candidate is active.
pub fn resolve_reporting(
    group: &str,
    candidates: &[ReportingConfig],
) -> std::result::Result<ResolvedReporting, ConfigError> {
    let active: Vec<&ReportingConfig> = candidates.iter().filter(|c| c.active).collect();

    match active.as_slice() {
        [] => Ok(ResolvedReporting::default()),
        [config] => {
            let mut resolved = ResolvedReporting::default();
            if !config.report_sinks.is_empty() {
                resolved.report_sinks = config.report_sinks.clone();
            }
            if let Some(supplier) = &config.statistics_supplier {
                resolved.statistics_supplier = Arc::clone(supplier);
            }
            Ok(resolved)
        }
        many => Err(ConfigError::MultipleActiveReporting {
            group: group.to_string(),
            count: many.len(),
        }),
    }
}

/// Built-in sink: one structured log line per evaluated test
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn name(&self) -> &str {
        "log"
    }

    fn generate_report(&self, contexts: &BTreeMap<String, Arc<EvaluationContext>>) -> Result<()> {
        for (name, context) in contexts {
            let Some(stats) = context.statistics() else {
                tracing::warn!(test = %name, group = context.group(), "Context was never finalized");
                continue;
            };

            tracing::info!(
                test = %name,
                group = context.group(),
                passed = context.passed(),
                total = stats.total_count,
                errors = stats.error_count,
                error_percentage = stats.error_percentage,
                throughput = stats.throughput,
                mean_latency_ms = stats.mean_latency_ms,
                p99_latency_ms = ?stats.latency_percentile(99),
                "Evaluation report"
            );
            for violation in context.violations() {
                tracing::info!(test = %name, %violation, "Threshold violated");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::Statistics;
    use std::time::Duration;

    struct NamedSink(&'static str);

    impl ReportSink for NamedSink {
        fn name(&self) -> &str {
            self.0
        }

        fn generate_report(&self, _: &BTreeMap<String, Arc<EvaluationContext>>) -> Result<()> {
            Ok(())
        }
    }

    struct FixedStatistics;

    impl StatisticsCalculator for FixedStatistics {
        fn name(&self) -> &str {
            "fixed"
        }

        fn record(&self, _latency: Duration, _is_error: bool) {}

        fn snapshot(&self, _measured: Duration, _percentiles: &[u8]) -> Statistics {
            Statistics::default()
        }

        fn reset(&self) {}
    }

    fn sink_names(resolved: &ResolvedReporting) -> Vec<&str> {
        resolved.report_sinks.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_no_candidates_uses_defaults() {
        let resolved = resolve_reporting("Orders", &[]).unwrap();
        assert_eq!(sink_names(&resolved), vec!["log"]);
        assert_eq!((resolved.statistics_supplier)().name(), "descriptive");
    }

    #[test]
    fn test_inactive_candidate_is_ignored() {
        let candidate = ReportingConfig::new().report_sink(Arc::new(NamedSink("html")));
        let resolved = resolve_reporting("Orders", &[candidate]).unwrap();
        assert_eq!(sink_names(&resolved), vec!["log"]);
    }

    #[test]
    fn test_active_candidate_overrides_sinks() {
        let candidate = ReportingConfig::new()
            .active(true)
            .report_sink(Arc::new(NamedSink("html")));
        let resolved = resolve_reporting("Orders", &[candidate]).unwrap();
        assert_eq!(sink_names(&resolved), vec!["html"]);
        assert_eq!((resolved.statistics_supplier)().name(), "descriptive");
    }

    #[test]
    fn test_active_candidate_overrides_statistics() {
        let candidate = ReportingConfig::new()
            .active(true)
            .report_sink(Arc::new(NamedSink("html")))
            .statistics_supplier(Arc::new(|| {
                Arc::new(FixedStatistics) as Arc<dyn StatisticsCalculator>
            }));
        let resolved = resolve_reporting("Orders", &[candidate]).unwrap();
        assert_eq!((resolved.statistics_supplier)().name(), "fixed");
    }

    #[test]
    fn test_two_active_candidates_are_fatal() {
        let a = ReportingConfig::new().active(true);
        let b = ReportingConfig::new().active(true);
        let inactive = ReportingConfig::new();

        let err = resolve_reporting("Orders", &[a, inactive, b]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MultipleActiveReporting { ref group, count: 2 } if group == "Orders"
        ));
    }

    #[test]
    fn test_log_sink_handles_unfinalized_context() {
        let mut contexts = BTreeMap::new();
        contexts.insert(
            "a".to_string(),
            Arc::new(EvaluationContext::new("a", "Orders", Default::default(), false)),
        );
        assert!(LogReportSink.generate_report(&contexts).is_ok());
    }
}

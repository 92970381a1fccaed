//! Per-class glue between a host test runner and the evaluation engine

use std::sync::Arc;

use crate::config::EvaluationConfig;
use crate::context::EvaluationContext;
use crate::error::{Error, Result};
use crate::invocation::InvocationHandle;
use crate::registry::ActiveContextRegistry;
use crate::reporting::{resolve_reporting, ReportingConfig, ResolvedReporting};
use crate::scheduler::SchedulerBuilder;
use crate::traits::{ReportSink, StatisticsCalculator};

/// Runs the tests of one class and publishes their contexts
///
/// Created once per class run: resolves the reporting setup, then clears the
/// class's stale registry entries. Each evaluated test gets its own scheduler
/// and calculator; [`finish`](Self::finish) hands the collected contexts to
/// the class's sinks.
pub struct TestClassHarness {
    group: String,
    registry: Arc<ActiveContextRegistry>,
    reporting: ResolvedReporting,
    handle_signals: bool,
}

impl TestClassHarness {
    /// Set up a class run
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if more than one reporting candidate is active.
    pub fn new(
        group: impl Into<String>,
        registry: Arc<ActiveContextRegistry>,
        candidates: &[ReportingConfig],
    ) -> Result<Self> {
        let group = group.into();
        let reporting = resolve_reporting(&group, candidates)?;
        registry.begin_run(&group);

        tracing::debug!(group = %group, reporting = ?reporting, "Test class harness ready");

        Ok(Self {
            group,
            registry,
            reporting,
            handle_signals: false,
        })
    }

    /// Let Ctrl+C end a running evaluation early instead of the process
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Owning class identity
    pub fn group(&self) -> &str {
        &self.group
    }

    /// A fresh calculator from the resolved supplier
    pub fn statistics_calculator(&self) -> Arc<dyn StatisticsCalculator> {
        (self.reporting.statistics_supplier)()
    }

    /// Sinks this class reports to
    pub fn report_sinks(&self) -> &[Arc<dyn ReportSink>] {
        &self.reporting.report_sinks
    }

    /// Run one test
    ///
    /// Without a configuration the body runs exactly once and nothing is
    /// registered. With one, the body is evaluated and the finalized context
    /// is registered and returned; check its verdict for threshold failures.
    ///
    /// # Errors
    ///
    /// Returns the body's failure for a single execution, or a setup error
    /// for an evaluation. A test name already evaluated in this class run is
    /// rejected before anything is invoked.
    pub async fn run_test(
        &self,
        test_name: &str,
        config: Option<&EvaluationConfig>,
        invocation: InvocationHandle,
    ) -> Result<Option<Arc<EvaluationContext>>> {
        let Some(config) = config else {
            tracing::debug!(test = test_name, group = %self.group, "No evaluation configured, running once");
            invocation.execute(None).await.result.map_err(Error::Invocation)?;
            return Ok(None);
        };

        if self.registry.contains(&self.group, test_name) {
            return Err(Error::config(format!(
                "context for '{}' already registered in '{}'",
                test_name, self.group
            )));
        }

        let scheduler = SchedulerBuilder::new(test_name)
            .group(self.group.clone())
            .config(config.clone())
            .statistics(self.statistics_calculator())
            .build()?;

        let context = if self.handle_signals {
            scheduler.evaluate_with_signal_handling(invocation).await?
        } else {
            scheduler.evaluate(invocation).await?
        };

        let context = Arc::new(context);
        self.registry.register(Arc::clone(&context))?;
        Ok(Some(context))
    }

    /// Publish every registered context of this class
    ///
    /// # Errors
    ///
    /// Returns `Error::Report` if a sink failed. Verdicts stay valid.
    pub fn finish(&self) -> Result<()> {
        tracing::debug!(
            group = %self.group,
            contexts = self.registry.len(&self.group),
            "Publishing reports"
        );
        self.registry.publish(&self.group, &self.reporting.report_sinks)
    }
}

impl std::fmt::Debug for TestClassHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClassHarness")
            .field("group", &self.group)
            .field("reporting", &self.reporting)
            .field("handle_signals", &self.handle_signals)
            .finish()
    }
}

//! Builder pattern for EvaluationScheduler construction

use std::sync::Arc;

use crate::config::EvaluationConfig;
use crate::error::Result;
use crate::statistics::DescriptiveStatistics;
use crate::traits::StatisticsCalculator;

use super::executor::EvaluationScheduler;

/// Builder for creating an EvaluationScheduler with proper configuration
///
/// # Example
///
/// ```ignore
/// let scheduler = SchedulerBuilder::new("checkout")
///     .group("OrderTests")
///     .config(config)
///     .statistics(Arc::new(DescriptiveStatistics::new()))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    test_name: String,
    group: String,
    config: EvaluationConfig,
    statistics: Option<Arc<dyn StatisticsCalculator>>,
}

impl SchedulerBuilder {
    /// Create a builder for the named test with default configuration
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            group: String::new(),
            config: EvaluationConfig::default(),
            statistics: None,
        }
    }

    /// Set the owning class identity
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the full evaluation configuration
    pub fn config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker count
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Set the statistics calculator (DescriptiveStatistics if not set)
    pub fn statistics(mut self, statistics: Arc<dyn StatisticsCalculator>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Build the scheduler
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration fails validation.
    pub fn build(self) -> Result<EvaluationScheduler> {
        self.config.validate()?;

        let statistics = self
            .statistics
            .unwrap_or_else(|| Arc::new(DescriptiveStatistics::new()));

        Ok(EvaluationScheduler::new(
            self.test_name,
            self.group,
            self.config,
            statistics,
        ))
    }
}

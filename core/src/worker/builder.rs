//! Builder pattern for Worker construction

use crate::error::{Error, Result};
use crate::invocation::InvocationHandle;
use crate::traits::StatisticsCalculator;

use super::executor::Worker;
use super::rate_limiter::RateController;
use super::window::MeasurementWindow;

use std::sync::Arc;
use std::time::Duration;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .invocation(invocation)
///     .statistics(statistics)
///     .rate_controller(rate_controller)
///     .window(window)
///     .build()?;
/// ```
pub struct WorkerBuilder {
    id: usize,
    invocation: Option<InvocationHandle>,
    statistics: Option<Arc<dyn StatisticsCalculator>>,
    rate_controller: Option<Arc<RateController>>,
    window: Option<MeasurementWindow>,
    invocation_timeout: Option<Duration>,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            invocation: None,
            statistics: None,
            rate_controller: None,
            window: None,
            invocation_timeout: None,
        }
    }

    /// Set the test body
    pub fn invocation(mut self, invocation: InvocationHandle) -> Self {
        self.invocation = Some(invocation);
        self
    }

    /// Set the statistics calculator
    pub fn statistics(mut self, statistics: Arc<dyn StatisticsCalculator>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Set the shared rate controller (unlimited if not set)
    pub fn rate_controller(mut self, rate_controller: Arc<RateController>) -> Self {
        self.rate_controller = Some(rate_controller);
        self
    }

    /// Set the measurement window
    pub fn window(mut self, window: MeasurementWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the per-invocation timeout
    pub fn invocation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Build the worker
    ///
    /// # Errors
    ///
    /// Returns an error if the invocation, statistics or window are missing.
    pub fn build(self) -> Result<Worker> {
        let invocation = self
            .invocation
            .ok_or_else(|| Error::missing_config("invocation"))?;
        let statistics = self
            .statistics
            .ok_or_else(|| Error::missing_config("statistics"))?;
        let window = self.window.ok_or_else(|| Error::missing_config("window"))?;
        let rate_controller = self
            .rate_controller
            .unwrap_or_else(|| Arc::new(RateController::unlimited()));

        Ok(Worker::new(
            self.id,
            invocation,
            statistics,
            rate_controller,
            window,
            self.invocation_timeout,
        ))
    }
}

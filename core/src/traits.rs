//! Core traits for invocations, statistics and report sinks
//!
//! The scheduler only depends on these seams; hosts plug in their own test
//! bodies, aggregators and report renderers behind them.

use crate::context::EvaluationContext;
use crate::invocation::{CompletionHandle, InvocationError};
use crate::statistics::Statistics;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Invocation Traits
// ============================================================================

/// A test body that completes when its future resolves
///
/// Returning `Err` (or panicking) marks the invocation as an error sample;
/// the error never leaves the worker.
#[async_trait]
pub trait Invocation: Send + Sync {
    /// Run the test body once
    async fn invoke(&self) -> Result<(), InvocationError>;
}

/// A test body that signals completion out of band
///
/// The worker hands over a [`CompletionHandle`] and waits for it to be
/// completed or failed; returning from `invoke` alone does not end the
/// invocation.
#[async_trait]
pub trait CompletionInvocation: Send + Sync {
    /// Start the test body once
    async fn invoke(&self, completion: CompletionHandle);
}

// ============================================================================
// Statistics Calculator Trait
// ============================================================================

/// Thread-safe recorder of measured samples
///
/// Implementations do their own synchronization; workers call `record`
/// concurrently and never lock the calculator externally.
pub trait StatisticsCalculator: Send + Sync {
    /// Calculator name for identification
    fn name(&self) -> &str {
        "custom"
    }

    /// Record one measured invocation
    fn record(&self, latency: Duration, is_error: bool);

    /// Compute derived metrics over a measured window of the given length
    ///
    /// `percentiles` lists extra latency percentiles to compute.
    fn snapshot(&self, measured: Duration, percentiles: &[u8]) -> Statistics;

    /// Discard every recorded sample
    fn reset(&self);
}

// ============================================================================
// Report Sink Trait
// ============================================================================

/// Consumer of finalized evaluation contexts
///
/// Called once per test class with every evaluated method of that class,
/// keyed by test name. Implementations live in the report crate.
pub trait ReportSink: Send + Sync {
    /// Sink name for identification
    fn name(&self) -> &str;

    /// Render or publish the contexts of one class
    fn generate_report(
        &self,
        contexts: &BTreeMap<String, Arc<EvaluationContext>>,
    ) -> crate::Result<()>;
}

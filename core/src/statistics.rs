//! Statistics aggregation and percentile calculation
//!
//! Workers feed measured samples into a [`StatisticsCalculator`]; the
//! scheduler takes one [`Statistics`] snapshot once the run is over.

use crate::traits::StatisticsCalculator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Percentiles always present in a snapshot, in addition to those a
/// threshold asks for
pub const DEFAULT_PERCENTILES: [u8; 4] = [50, 90, 95, 99];

/// Immutable snapshot of an evaluation's measured samples
///
/// Latency figures are in milliseconds and describe successful invocations only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Measured invocations (successes + errors)
    pub total_count: u64,
    /// Successful invocations
    pub success_count: u64,
    /// Failed invocations
    pub error_count: u64,
    /// Error percentage (0 - 100), 0 when nothing was measured
    pub error_percentage: f64,
    /// Successful invocations per measured second
    pub throughput: f64,
    /// Length of the measured window in seconds
    pub measured_secs: f64,
    /// Minimum latency
    pub min_latency_ms: f64,
    /// Maximum latency
    pub max_latency_ms: f64,
    /// Mean latency
    pub mean_latency_ms: f64,
    /// Latency standard deviation
    pub stddev_latency_ms: f64,
    /// Latency per percentile
    pub percentiles: BTreeMap<u8, f64>,
}

impl Statistics {
    /// Latency at the given percentile, if it was computed
    pub fn latency_percentile(&self, percentile: u8) -> Option<f64> {
        self.percentiles.get(&percentile).copied()
    }

    /// Success percentage (0 - 100)
    pub fn success_percentage(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            100.0 - self.error_percentage
        }
    }
}

/// Error percentage with the empty case defined as 0
pub fn error_percentage(errors: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 * 100.0 / total as f64
    }
}

/// Successes per second over the measured window, 0 for an empty window
pub fn throughput(successes: u64, measured: Duration) -> f64 {
    let secs = measured.as_secs_f64();
    if secs > 0.0 {
        successes as f64 / secs
    } else {
        0.0
    }
}

/// Default statistics calculator backed by an HDR histogram
///
/// Latencies are kept at microsecond resolution with 3 significant digits,
/// up to one hour. Percentiles come from `value_at_quantile`, i.e. nearest
/// rank within the histogram's precision. All state sits behind one lock so a
/// snapshot never sees a count without its latency.
pub struct DescriptiveStatistics {
    inner: Mutex<Inner>,
}

struct Inner {
    histogram: hdrhistogram::Histogram<u64>,
    successes: u64,
    errors: u64,
}

impl DescriptiveStatistics {
    /// Create an empty calculator
    pub fn new() -> Self {
        // 1us to 1 hour, 3 significant digits
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000_000, 3)
            .expect("Failed to create histogram");
        Self {
            inner: Mutex::new(Inner {
                histogram,
                successes: 0,
                errors: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DescriptiveStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsCalculator for DescriptiveStatistics {
    fn name(&self) -> &str {
        "descriptive"
    }

    fn record(&self, latency: Duration, is_error: bool) {
        let mut inner = self.lock();
        if is_error {
            inner.errors += 1;
        } else {
            inner.successes += 1;
            let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            inner.histogram.saturating_record(micros);
        }
    }

    fn snapshot(&self, measured: Duration, percentiles: &[u8]) -> Statistics {
        let inner = self.lock();
        let total_count = inner.successes + inner.errors;
        let histogram = &inner.histogram;

        let to_ms = |micros: u64| micros as f64 / 1000.0;

        let mut stats = Statistics {
            total_count,
            success_count: inner.successes,
            error_count: inner.errors,
            error_percentage: error_percentage(inner.errors, total_count),
            throughput: throughput(inner.successes, measured),
            measured_secs: measured.as_secs_f64(),
            ..Default::default()
        };

        let requested = DEFAULT_PERCENTILES.iter().chain(percentiles.iter());
        if histogram.is_empty() {
            stats.percentiles = requested.map(|&p| (p, 0.0)).collect();
            return stats;
        }

        stats.min_latency_ms = to_ms(histogram.min());
        stats.max_latency_ms = to_ms(histogram.max());
        stats.mean_latency_ms = histogram.mean() / 1000.0;
        stats.stddev_latency_ms = histogram.stdev() / 1000.0;
        stats.percentiles = requested
            .map(|&p| {
                let quantile = f64::from(p.min(100)) / 100.0;
                (p, to_ms(histogram.value_at_quantile(quantile)))
            })
            .collect();

        stats
    }

    fn reset(&self) {
        let mut inner = self.lock();
        inner.histogram.reset();
        inner.successes = 0;
        inner.errors = 0;
    }
}

impl std::fmt::Debug for DescriptiveStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("DescriptiveStatistics")
            .field("successes", &inner.successes)
            .field("errors", &inner.errors)
            .finish()
    }
}

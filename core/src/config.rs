//! Evaluation configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration of a single evaluation run
///
/// Describes how a test body should be exercised: how many workers invoke it
/// concurrently, how long the unmeasured warm-up and the measured window last,
/// and the aggregate rate ceiling shared by all workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Number of concurrent worker tasks
    pub threads: usize,

    /// Length of the measured window in milliseconds
    pub duration_ms: u64,

    /// Unmeasured warm-up preceding the measured window, in milliseconds
    pub warm_up_ms: u64,

    /// Aggregate invocation ceiling across all workers (0 = unbounded)
    pub max_executions_per_second: u32,

    /// Per-invocation timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_timeout_ms: Option<u64>,

    /// How long the scheduler waits for in-flight invocations after the deadline
    pub drain_grace_ms: u64,

    /// Pass/fail bounds checked after the run
    pub thresholds: Thresholds,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            duration_ms: 60_000,
            warm_up_ms: 0,
            max_executions_per_second: 0,
            invocation_timeout_ms: None,
            drain_grace_ms: 1_000,
            thresholds: Thresholds::default(),
        }
    }
}

impl EvaluationConfig {
    /// Create a new config with the given worker count
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            ..Default::default()
        }
    }

    /// Set the measured window length
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the warm-up length
    pub fn with_warm_up_ms(mut self, warm_up_ms: u64) -> Self {
        self.warm_up_ms = warm_up_ms;
        self
    }

    /// Set the aggregate rate ceiling (0 disables rate limiting)
    pub fn with_max_executions_per_second(mut self, rate: u32) -> Self {
        self.max_executions_per_second = rate;
        self
    }

    /// Set the per-invocation timeout
    pub fn with_invocation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.invocation_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the drain grace period
    pub fn with_drain_grace_ms(mut self, grace_ms: u64) -> Self {
        self.drain_grace_ms = grace_ms;
        self
    }

    /// Set the thresholds
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Measured window
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Warm-up window
    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.warm_up_ms)
    }

    /// Drain grace period
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    /// Configured per-invocation timeout, if any
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_ms.map(Duration::from_millis)
    }

    /// Rate ceiling, `None` when unbounded
    pub fn rate_limit(&self) -> Option<u32> {
        (self.max_executions_per_second > 0).then_some(self.max_executions_per_second)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads(
                "threads must be at least 1".into(),
            ));
        }

        if self.warm_up_ms >= self.duration_ms {
            return Err(ConfigError::InvalidDuration(format!(
                "warm_up_ms ({}) must be less than duration_ms ({})",
                self.warm_up_ms, self.duration_ms
            )));
        }

        if self.invocation_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidTimeout(
                "invocation timeout must be positive".into(),
            ));
        }

        self.thresholds.validate()
    }
}

/// Pass/fail bounds on derived statistics
///
/// Every bound is optional; an empty set of thresholds always passes.
/// Latency bounds are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Highest allowed error percentage (0 - 100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_error_percentage: Option<f64>,

    /// Lowest allowed throughput (successful invocations per second)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_throughput: Option<f64>,

    /// Lowest allowed minimum latency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_latency_ms: Option<f64>,

    /// Highest allowed maximum latency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<f64>,

    /// Highest allowed mean latency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_latency_ms: Option<f64>,

    /// Highest allowed latency per percentile (percentile -> ms)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub max_latency_percentiles: BTreeMap<u8, f64>,
}

impl Thresholds {
    /// Create an empty set of thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error percentage ceiling
    pub fn with_max_error_percentage(mut self, pct: f64) -> Self {
        self.max_error_percentage = Some(pct);
        self
    }

    /// Set the throughput floor
    pub fn with_min_throughput(mut self, per_second: f64) -> Self {
        self.min_throughput = Some(per_second);
        self
    }

    /// Set the minimum latency floor
    pub fn with_min_latency_ms(mut self, ms: f64) -> Self {
        self.min_latency_ms = Some(ms);
        self
    }

    /// Set the maximum latency ceiling
    pub fn with_max_latency_ms(mut self, ms: f64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    /// Set the mean latency ceiling
    pub fn with_mean_latency_ms(mut self, ms: f64) -> Self {
        self.mean_latency_ms = Some(ms);
        self
    }

    /// Add a percentile latency ceiling
    pub fn with_max_latency_percentile(mut self, percentile: u8, ms: f64) -> Self {
        self.max_latency_percentiles.insert(percentile, ms);
        self
    }

    /// Whether no bound is configured
    pub fn is_empty(&self) -> bool {
        self.max_error_percentage.is_none()
            && self.min_throughput.is_none()
            && self.min_latency_ms.is_none()
            && self.max_latency_ms.is_none()
            && self.mean_latency_ms.is_none()
            && self.max_latency_percentiles.is_empty()
    }

    /// Validate the thresholds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pct) = self.max_error_percentage {
            if !(0.0..=100.0).contains(&pct) {
                return Err(ConfigError::InvalidThreshold(format!(
                    "max_error_percentage must be within 0..=100, got {pct}"
                )));
            }
        }

        let non_negative = [
            ("min_throughput", self.min_throughput),
            ("min_latency_ms", self.min_latency_ms),
            ("max_latency_ms", self.max_latency_ms),
            ("mean_latency_ms", self.mean_latency_ms),
        ];
        for (name, value) in non_negative {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ConfigError::InvalidThreshold(format!(
                        "{name} must be a non-negative number, got {v}"
                    )));
                }
            }
        }

        for (&percentile, &ms) in &self.max_latency_percentiles {
            check_percentile_entry(percentile, ms)?;
        }

        Ok(())
    }
}

/// Parse the compact percentile form `"90:7,95:7.5"` into percentile -> ms bounds
///
/// Whitespace around entries is ignored, as are empty entries.
pub fn parse_percentiles(spec: &str) -> Result<BTreeMap<u8, f64>, ConfigError> {
    let mut parsed = BTreeMap::new();

    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (percentile, ms) = entry.split_once(':').ok_or_else(|| {
            ConfigError::InvalidPercentiles(format!("expected '<percentile>:<ms>', got '{entry}'"))
        })?;

        let percentile: u8 = percentile.trim().parse().map_err(|_| {
            ConfigError::InvalidPercentiles(format!("invalid percentile in '{entry}'"))
        })?;
        let ms: f64 = ms.trim().parse().map_err(|_| {
            ConfigError::InvalidPercentiles(format!("invalid latency in '{entry}'"))
        })?;

        check_percentile_entry(percentile, ms)?;
        parsed.insert(percentile, ms);
    }

    Ok(parsed)
}

fn check_percentile_entry(percentile: u8, ms: f64) -> Result<(), ConfigError> {
    if percentile == 0 || percentile > 100 {
        return Err(ConfigError::InvalidPercentiles(format!(
            "percentile must be within 1..=100, got {percentile}"
        )));
    }
    if !ms.is_finite() || ms < 0.0 {
        return Err(ConfigError::InvalidPercentiles(format!(
            "latency bound for p{percentile} must be a non-negative number, got {ms}"
        )));
    }
    Ok(())
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid threads: {0}")]
    InvalidThreads(String),

    /// Invalid duration or warm-up
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Invalid invocation timeout
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    /// Invalid threshold bound
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Invalid percentile specification
    #[error("Invalid percentiles: {0}")]
    InvalidPercentiles(String),

    /// More than one reporting configuration is marked active for a class
    #[error("{count} reporting configurations are marked active for '{group}', expected at most one")]
    MultipleActiveReporting {
        /// Owning class identity
        group: String,
        /// Number of active candidates
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvaluationConfig::default();
        assert_eq!(config.threads, 1);
        assert_eq!(config.duration_ms, 60_000);
        assert_eq!(config.warm_up_ms, 0);
        assert!(config.rate_limit().is_none());
        assert!(config.thresholds.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = EvaluationConfig::new(4)
            .with_duration_ms(1_000)
            .with_warm_up_ms(100)
            .with_max_executions_per_second(1_000)
            .with_invocation_timeout_ms(50)
            .with_thresholds(Thresholds::new().with_max_error_percentage(1.0));

        assert_eq!(config.threads, 4);
        assert_eq!(config.duration(), Duration::from_secs(1));
        assert_eq!(config.warm_up(), Duration::from_millis(100));
        assert_eq!(config.rate_limit(), Some(1_000));
        assert_eq!(config.invocation_timeout(), Some(Duration::from_millis(50)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_threads() {
        let config = EvaluationConfig {
            threads: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreads(_))
        ));
    }

    #[test]
    fn test_config_validation_warm_up_not_below_duration() {
        let config = EvaluationConfig::new(1)
            .with_duration_ms(100)
            .with_warm_up_ms(100);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration(_))
        ));

        let zero = EvaluationConfig::new(1).with_duration_ms(0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let config = EvaluationConfig::new(1).with_invocation_timeout_ms(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Thresholds::new()
            .with_max_error_percentage(101.0)
            .validate()
            .is_err());
        assert!(Thresholds::new().with_min_throughput(-1.0).validate().is_err());
        assert!(Thresholds::new()
            .with_max_latency_percentile(0, 5.0)
            .validate()
            .is_err());
        assert!(Thresholds::new()
            .with_max_error_percentage(0.0)
            .with_max_latency_percentile(99, 5.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_parse_percentiles() {
        let parsed = parse_percentiles("90:7, 95:7.5,,99:12").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[&90], 7.0);
        assert_eq!(parsed[&95], 7.5);
        assert_eq!(parsed[&99], 12.0);

        assert!(parse_percentiles("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_percentiles_rejects_garbage() {
        assert!(parse_percentiles("90").is_err());
        assert!(parse_percentiles("ninety:7").is_err());
        assert!(parse_percentiles("90:fast").is_err());
        assert!(parse_percentiles("101:7").is_err());
        assert!(parse_percentiles("50:-1").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = EvaluationConfig::new(2)
            .with_duration_ms(500)
            .with_thresholds(Thresholds::new().with_max_latency_percentile(95, 10.0));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("invocation_timeout_ms"));

        let deserialized: EvaluationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_partial_deserialization_uses_defaults() {
        let config: EvaluationConfig =
            serde_json::from_str(r#"{"threads": 3, "duration_ms": 2000}"#).unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.duration_ms, 2_000);
        assert_eq!(config.drain_grace_ms, 1_000);
    }
}

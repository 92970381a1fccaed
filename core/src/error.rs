//! Error types for loadgauge-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::invocation::InvocationError;
use crate::thresholds::ThresholdViolation;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or conflicting configuration, raised before any worker starts
    #[error("configuration error: {0}")]
    Config(String),

    /// A scheduler was asked to evaluate a second time
    #[error("evaluation of '{0}' has already been performed")]
    AlreadyEvaluated(String),

    /// One or more thresholds were violated by the measured statistics
    #[error("performance thresholds not met: {}", describe_violations(.0))]
    ThresholdsNotMet(Vec<ThresholdViolation>),

    /// A report sink failed while generating a report
    #[error("report error: {0}")]
    Report(String),

    /// A single (non-evaluated) test execution failed
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Configuration error for a required component that was never supplied
    pub fn missing_config(component: &str) -> Self {
        Error::Config(format!("missing required component: {component}"))
    }

    /// Create a report error
    pub fn report(msg: impl Into<String>) -> Self {
        Error::Report(msg.into())
    }

    /// Whether this error is a post-run threshold verdict rather than a setup failure
    pub fn is_threshold_failure(&self) -> bool {
        matches!(self, Error::ThresholdsNotMet(_))
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

fn describe_violations(violations: &[ThresholdViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for loadgauge-report

use thiserror::Error;

/// Report generation error
#[derive(Error, Debug)]
pub enum ReportError {
    /// Writing the report failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the report failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The contexts handed over cannot be reported
    #[error("invalid report input: {0}")]
    InvalidInput(String),
}

/// Result type alias for report operations
pub type ReportResult<T> = std::result::Result<T, ReportError>;

impl From<ReportError> for loadgauge_core::Error {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Io(e) => loadgauge_core::Error::Io(e),
            other => loadgauge_core::Error::report(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_into_core_error() {
        let err: loadgauge_core::Error = ReportError::InvalidInput("mixed groups".into()).into();
        assert!(matches!(err, loadgauge_core::Error::Report(ref msg) if msg.contains("mixed groups")));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing dir");
        let err: loadgauge_core::Error = ReportError::from(io).into();
        assert!(matches!(err, loadgauge_core::Error::Io(_)));
    }
}

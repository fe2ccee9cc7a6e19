//! Error handling module
//!
//! Structured error types for the analysis run. Inner components never
//! terminate the process; every failure propagates as an [`AuditError`]
//! to the single top-level boundary in `main`.

use thiserror::Error;

/// Main error type for analysis operations.
#[derive(Error, Debug)]
pub enum AuditError {
    /// The graph data source cannot be reached or a query failed at the
    /// transport or auth level. Fatal to the entire run.
    #[error("graph data source error: {0}")]
    DataSource(String),

    /// A user-specified domain has no corresponding data in the graph.
    /// Fatal to the run before any analysis starts.
    #[error("no data is available for domain {domain}")]
    UnknownDomain { domain: String },

    /// Configuration file missing, unreadable, or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Report output error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<neo4rs::Error> for AuditError {
    fn from(err: neo4rs::Error) -> Self {
        AuditError::DataSource(err.to_string())
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuditError::DataSource("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "graph data source error: connection refused"
        );

        let err = AuditError::UnknownDomain {
            domain: "CONTOSO".to_string(),
        };
        assert_eq!(err.to_string(), "no data is available for domain CONTOSO");

        let err = AuditError::Config("missing uri".to_string());
        assert_eq!(err.to_string(), "configuration error: missing uri");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: AuditError = io_err.into();
        assert!(matches!(err, AuditError::Io(_)));
    }
}

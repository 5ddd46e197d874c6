//! Error types for export operations

use thiserror::Error;

use crate::matrix::ValueType;

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Exit code for a successful run
pub const EXIT_OK: i32 = 0;

/// Exit code for configuration failures
pub const EXIT_CONFIGURATION_FAILURE: i32 = 1;

/// Exit code for query or push failures
pub const EXIT_EXECUTION_FAILURE: i32 = 2;

/// Error taxonomy shared by the exporter components
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Unsupported prometheus result type: {0}")]
    UnsupportedResultType(ValueType),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(message: S) -> Self {
        Self::Query(message.into())
    }

    /// Create a new delivery error
    pub fn delivery<S: Into<String>>(message: S) -> Self {
        Self::Delivery(message.into())
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ExportError::Configuration(_) => "configuration",
            ExportError::Query(_) => "query",
            ExportError::UnsupportedResultType(_) => "unsupported_result_type",
            ExportError::Delivery(_) => "delivery",
            ExportError::Parse(_) => "parse",
            ExportError::Json(_) => "json",
        }
    }

    /// Process exit code a command-line run should report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportError::Configuration(_) | ExportError::Parse(_) => EXIT_CONFIGURATION_FAILURE,
            _ => EXIT_EXECUTION_FAILURE,
        }
    }
}

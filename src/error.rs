//! Unified error hierarchy for healthtrend
//!
//! Data-quality problems inside the engine are never errors: bad points are
//! skipped and thin data degrades to a degenerate model. The variants below
//! cover programmer misuse of the API and the import/export/config edges.

use std::path::PathBuf;
use thiserror::Error;

use crate::export::ExportError;

/// Top-level error type for all healthtrend operations
#[derive(Debug, Error)]
pub enum HealthTrendError {
    /// Wrong argument shape or value passed to an engine API
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Log import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Result export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while loading health logs from files
#[derive(Debug, Error)]
pub enum ImportError {
    /// No importer handles this file
    #[error("Unsupported format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Format-specific parsing error
    #[error("Parse error in {format}: {reason}")]
    ParseError { format: String, reason: String },

    /// A column the importer cannot work without is absent
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    /// Invalid document structure
    #[error("Invalid data structure: {reason}")]
    InvalidStructure { reason: String },
}

/// Result type alias for healthtrend operations
pub type Result<T> = std::result::Result<T, HealthTrendError>;

impl HealthTrendError {
    /// Shorthand for an `InvalidArgument` error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        HealthTrendError::InvalidArgument(message.into())
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            HealthTrendError::Import(ImportError::MissingColumn { .. }) => ErrorSeverity::Warning,
            HealthTrendError::Import(_) => ErrorSeverity::Error,
            HealthTrendError::InvalidArgument(_) => ErrorSeverity::Error,
            HealthTrendError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            HealthTrendError::Import(ImportError::UnsupportedFormat { path }) => {
                format!(
                    "Cannot read {}: only .csv and .json health logs are supported",
                    path.display()
                )
            }
            HealthTrendError::Import(ImportError::MissingColumn { column }) => {
                format!("The log file has no '{}' column", column)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

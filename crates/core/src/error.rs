//! Error types for document conversion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the docconv library.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Pandoc is not installed or not found in PATH.
    #[error("Pandoc not found. Please install pandoc and ensure 'pandoc' is in PATH")]
    EngineNotFound,

    /// The engine binary exists but could not report a usable version.
    #[error("Pandoc version check failed: {0}")]
    EngineUnavailable(String),

    /// Input file missing or not a regular file. Never retried.
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Batch input directory missing or not a directory.
    #[error("Input directory not found: {0}")]
    InputDirNotFound(PathBuf),

    /// The engine invocation failed.
    #[error("Conversion failed for '{path}': {message}")]
    EngineFailure { path: PathBuf, message: String },

    /// The engine reported success but the output cannot be read.
    #[error("Output file '{path}' is missing or unreadable after conversion")]
    OutputUnreadable { path: PathBuf },

    /// Output failed the size, ratio or structural checks.
    #[error("Output validation failed: {}", .errors.join("; "))]
    ValidationFailure { errors: Vec<String> },

    /// Engine call exceeded its configured timeout.
    #[error("Pandoc conversion timed out after {timeout_secs} seconds for '{path}'")]
    Timeout { path: PathBuf, timeout_secs: u64 },

    /// Service used before a successful `initialize()`.
    #[error("Conversion service is not initialized")]
    NotInitialized,

    /// Unknown or unsupported document format.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// No file in the batch directory matched the pattern.
    #[error("No files matching '{pattern}' found in '{dir}'")]
    NoMatchingFiles { dir: PathBuf, pattern: String },

    /// Output directory creation failed.
    #[error("Failed to create output directory '{path}': {message}")]
    OutputDirError { path: PathBuf, message: String },

    /// Task was cancelled between attempts.
    #[error("Conversion cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive inspection failed.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, ConversionError>;

impl From<figment::Error> for ConversionError {
    fn from(err: figment::Error) -> Self {
        ConversionError::InvalidConfig(err.to_string())
    }
}

impl ConversionError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EngineFailure { .. }
                | Self::OutputUnreadable { .. }
                | Self::ValidationFailure { .. }
                | Self::Timeout { .. }
                | Self::OutputDirError { .. }
                | Self::Io(_)
        )
    }

    /// The outcome-level classification of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InputNotFound(_) | Self::InputDirNotFound(_) => FailureKind::InputNotFound,
            Self::ValidationFailure { .. } => FailureKind::ValidationFailure,
            Self::NotInitialized => FailureKind::NotInitialized,
            Self::Cancelled => FailureKind::Cancelled,
            Self::NoMatchingFiles { .. } => FailureKind::NoMatchingFiles,
            Self::UnsupportedFormat(_) | Self::InvalidConfig(_) => FailureKind::InvalidRequest,
            _ => FailureKind::EngineFailure,
        }
    }
}

/// Failure classification carried on conversion outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input missing at task start (permanent).
    InputNotFound,
    /// Engine invocation failed on every attempt.
    EngineFailure,
    /// Output never passed validation.
    ValidationFailure,
    /// Service precondition failure.
    NotInitialized,
    /// Cancelled between attempts.
    Cancelled,
    /// Batch discovery found nothing.
    NoMatchingFiles,
    /// Request could not be interpreted (unknown format, bad path).
    InvalidRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_engine_not_found() {
        let msg = ConversionError::EngineNotFound.to_string();
        assert!(msg.contains("Pandoc not found"));
        assert!(msg.contains("PATH"));
    }

    #[test]
    fn test_error_display_engine_failure() {
        let err = ConversionError::EngineFailure {
            path: PathBuf::from("/docs/report.md"),
            message: "exit status 64".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/docs/report.md"));
        assert!(msg.contains("exit status 64"));
    }

    #[test]
    fn test_error_display_validation_joins_errors() {
        let err = ConversionError::ValidationFailure {
            errors: vec!["too small".to_string(), "bad ratio".to_string()],
        };
        assert_eq!(err.to_string(), "Output validation failed: too small; bad ratio");
    }

    #[test]
    fn test_error_display_timeout() {
        let err = ConversionError::Timeout {
            path: PathBuf::from("notes.md"),
            timeout_secs: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("30 seconds"));
        assert!(msg.contains("notes.md"));
    }

    #[test]
    fn test_error_display_no_matching_files() {
        let err = ConversionError::NoMatchingFiles {
            dir: PathBuf::from("/in"),
            pattern: "*.md".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("*.md"));
        assert!(msg.contains("/in"));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ConversionError = io_err.into();
        assert!(matches!(err, ConversionError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ConversionError::EngineFailure {
            path: PathBuf::from("a.md"),
            message: String::new(),
        }
        .is_retryable());
        assert!(ConversionError::ValidationFailure { errors: vec![] }.is_retryable());
        assert!(!ConversionError::InputNotFound(PathBuf::from("a.md")).is_retryable());
        assert!(!ConversionError::NotInitialized.is_retryable());
        assert!(!ConversionError::Cancelled.is_retryable());
        assert!(!ConversionError::InvalidConfig("x".to_string()).is_retryable());
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            ConversionError::InputNotFound(PathBuf::from("x")).kind(),
            FailureKind::InputNotFound
        );
        assert_eq!(
            ConversionError::OutputUnreadable {
                path: PathBuf::from("x")
            }
            .kind(),
            FailureKind::EngineFailure
        );
        assert_eq!(
            ConversionError::UnsupportedFormat("pdf".to_string()).kind(),
            FailureKind::InvalidRequest
        );
        assert_eq!(ConversionError::Cancelled.kind(), FailureKind::Cancelled);
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::InputNotFound).unwrap();
        assert_eq!(json, "\"input_not_found\"");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_error() -> Result<u64> {
            Err(ConversionError::NotInitialized)
        }
        assert!(returns_error().is_err());
    }
}

//! Typed error taxonomy for the training and prediction pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the pipeline can report to its caller
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Schema error: missing required column(s): {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("Schema error: row {row}, column {column}: '{value}' is not a valid non-negative number")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Classifier has not been fitted; call fit before predict")]
    NotFitted,

    #[error("Dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid value for feature {feature}: {value} is not a finite number")]
    InvalidValue { feature: String, value: f64 },

    #[error(
        "Insufficient data: minority class has {available} samples, resampling needs at least {required}"
    )]
    InsufficientData { available: usize, required: usize },

    #[error("Cannot fit a classifier on an empty dataset")]
    EmptyDataset,

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Corrupt model file {}: {reason}", .path.display())]
    CorruptModel { path: PathBuf, reason: String },

    #[error("Incompatible model file {}: {reason}", .path.display())]
    IncompatibleModel { path: PathBuf, reason: String },

    #[error("Table error: {0}")]
    Table(#[from] csv::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PredictionError>;

impl PredictionError {
    /// Only environment failures are fatal; everything else is a caller-fixable precondition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PredictionError::Io { .. })
    }

    /// True for the `SchemaError` family (missing columns or unparseable cells)
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PredictionError::MissingColumns { .. } | PredictionError::InvalidCell { .. }
        )
    }

    /// Create a validation error with field context
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        PredictionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap an IO error with the path it happened on
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        PredictionError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_names_every_column() {
        let err = PredictionError::MissingColumns {
            columns: vec!["TX_AMOUNT".to_string(), "TX_TIME_SECONDS".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("TX_AMOUNT"));
        assert!(msg.contains("TX_TIME_SECONDS"));
        assert!(err.is_schema_error());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_is_fatal() {
        let err = PredictionError::io(
            "models/x.gz",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_fatal());
        assert!(err.to_string().contains("models/x.gz"));
    }
}

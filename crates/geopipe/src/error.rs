//! Custom error types for the processing pipeline.
//!
//! This module provides the error taxonomy for configuration, transform and
//! output failures using `thiserror`, together with helpers for attaching
//! pipeline-position context to a failure without losing its original code.

use thiserror::Error;

/// The main error type for the GeoJSON processing pipeline.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// An operation descriptor carries a `type` tag with no registry entry.
    #[error("Unknown operation type '{tag}'. Valid types: {valid:?}")]
    UnknownOperation { tag: String, valid: Vec<&'static str> },

    /// An output descriptor carries a `type` tag with no registry entry.
    #[error("Unknown output type '{tag}'. Valid types: {valid:?}")]
    UnknownOutput { tag: String, valid: Vec<&'static str> },

    /// A filter condition uses a comparison symbol outside the supported set.
    #[error("Unsupported filter operator '{symbol}'. Valid operators: {valid:?}")]
    InvalidOperator {
        symbol: String,
        valid: Vec<&'static str>,
    },

    /// A referenced column does not exist on the dataset.
    #[error("Column '{column}' not found ({context})")]
    MissingColumn { column: String, context: String },

    /// A group-by descriptor names an unsupported aggregation function.
    #[error("Unsupported aggregation '{function}' for column '{column}'. Valid functions: {valid:?}")]
    UnknownAggregation {
        function: String,
        column: String,
        valid: Vec<&'static str>,
    },

    /// A calculate expression could not be parsed.
    #[error("Invalid expression '{expression}': {reason}")]
    ExpressionSyntax { expression: String, reason: String },

    /// A filter compared a column against a value of an incompatible type.
    #[error("Cannot apply operator '{operator}' to column '{column}': {reason}")]
    ComparisonType {
        column: String,
        operator: String,
        reason: String,
    },

    /// Two parallel descriptor lists have different lengths.
    #[error("{context}: expected {expected} entries, got {actual}")]
    ArityMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// A limit descriptor requested a non-positive row count.
    #[error("Invalid limit n = {0} (must be at least 1)")]
    InvalidLimit(i64),

    /// A descriptor's parameters could not be interpreted.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A failure surfaced by a collaborator library (rendering, spreadsheet
    /// encoding, geometry decoding).
    #[error("{0}")]
    Collaborator(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Dataset error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable code identifying the error class.
    ///
    /// The CLI prints this next to the message so failures can be matched
    /// without parsing free text. Context wrappers preserve the code of the
    /// underlying error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            Self::UnknownOutput { .. } => "UNKNOWN_OUTPUT",
            Self::InvalidOperator { .. } => "INVALID_OPERATOR",
            Self::MissingColumn { .. } => "MISSING_COLUMN",
            Self::UnknownAggregation { .. } => "UNKNOWN_AGGREGATION",
            Self::ExpressionSyntax { .. } => "EXPRESSION_SYNTAX",
            Self::ComparisonType { .. } => "COMPARISON_TYPE",
            Self::ArityMismatch { .. } => "ARITY_MISMATCH",
            Self::InvalidLimit(_) => "INVALID_LIMIT",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Collaborator(_) => "COLLABORATOR_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "DATASET_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check whether this error (or the error it wraps) is a configuration
    /// problem rather than a data or collaborator failure.
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::UnknownOperation { .. }
            | Self::UnknownOutput { .. }
            | Self::InvalidOperator { .. }
            | Self::UnknownAggregation { .. }
            | Self::ArityMismatch { .. }
            | Self::InvalidLimit(_)
            | Self::InvalidConfig(_) => true,
            Self::WithContext { source, .. } => source.is_config_error(),
            _ => false,
        }
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}

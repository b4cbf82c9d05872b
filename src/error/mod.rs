//! Error types and handling for `speedgate`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Groups variants by the failure classes the evaluation engine and
//!   scheduler distinguish: configuration, validation, scope, scheduling
//! - Provides recovery hints for user-facing errors
//! - Provides structured JSON output for the `sg` binary

mod structured;

pub use structured::{ErrorCode, StructuredError};

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `speedgate` operations.
#[derive(Error, Debug)]
pub enum SpeedgateError {
    // === Configuration Errors ===
    /// An expectation or scenario is missing a required field.
    #[error("Configuration error: missing '{field}' field")]
    MissingField { field: String },

    /// An expectation references a metric with no recorded series.
    #[error("Metric '{metric}' not found. Available metrics: [{}]", available.join(", "))]
    UnknownMetric {
        metric: String,
        available: Vec<String>,
    },

    /// A method, operator, scope, mode, unit, or day name is not recognized.
    #[error("Unknown {kind}: '{name}'. Valid values: {valid}")]
    UnknownName {
        kind: &'static str,
        name: String,
        valid: String,
    },

    /// Generic configuration error (document shape, settings).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found at '{path}'")]
    ConfigNotFound { path: PathBuf },

    // === Validation Errors ===
    /// Input to the Aggregator or Comparator is invalid.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Multiple validation errors occurred.
    #[error("Validation errors: {}", format_validation_errors(errors))]
    ValidationErrors { errors: Vec<ValidationError> },

    // === Scope Errors ===
    /// No data within the requested iteration, window, or time range.
    #[error("Scope error: {0}")]
    Scope(String),

    // === Scheduling Errors ===
    /// A job's schedule block could not be turned into a trigger.
    #[error("Schedule error for scenario '{scenario_id}': {reason}")]
    ScheduleConfig { scenario_id: String, reason: String },

    /// A firing referenced a protocol with no registered executor.
    #[error("Unknown protocol: '{protocol}'. Registered protocols: {registered}")]
    UnknownProtocol {
        protocol: String,
        registered: String,
    },

    /// The external test executor reported a failure.
    #[error("Execution failed for scenario '{scenario_id}': {reason}")]
    Execution { scenario_id: String, reason: String },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A single field validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// The reason for the validation failure.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SpeedgateError {
    /// Errors that are fatal to one expectation only.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::UnknownMetric { .. }
                | Self::UnknownName { .. }
                | Self::Config(_)
                | Self::ConfigNotFound { .. }
        )
    }

    /// Can the user fix this by editing configuration or input data?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::UnknownMetric { .. }
                | Self::UnknownName { .. }
                | Self::Config(_)
                | Self::ConfigNotFound { .. }
                | Self::Validation { .. }
                | Self::ValidationErrors { .. }
                | Self::ScheduleConfig { .. }
                | Self::UnknownProtocol { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => Some("Pass --config or set SG_CONFIG"),
            Self::MissingField { .. } => {
                Some("Every expectation needs 'metric', 'operator' and 'value'")
            }
            Self::UnknownMetric { .. } => {
                Some("Check the metric name or ingest measurements for it first")
            }
            Self::UnknownName { .. } => Some("Run: sg methods"),
            Self::Scope(_) => Some("Widen the window or check the iteration number"),
            Self::ScheduleConfig { .. } => Some("Run: sg check"),
            Self::UnknownProtocol { .. } => Some("Valid protocols: speed_test, voip_test"),
            _ => None,
        }
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown-name error listing the valid alternatives.
    #[must_use]
    pub fn unknown_name(kind: &'static str, name: impl Into<String>, valid: &[&str]) -> Self {
        Self::UnknownName {
            kind,
            name: name.into(),
            valid: valid.join(", "),
        }
    }

    /// Create a scope error.
    #[must_use]
    pub fn scope(reason: impl Into<String>) -> Self {
        Self::Scope(reason.into())
    }

    /// Create from multiple validation errors.
    #[must_use]
    pub fn from_validation_errors(errors: Vec<ValidationError>) -> Self {
        if errors.len() == 1 {
            let err = &errors[0];
            Self::Validation {
                field: err.field.clone(),
                reason: err.message.clone(),
            }
        } else {
            Self::ValidationErrors { errors }
        }
    }
}

/// Result type using `SpeedgateError`.
pub type Result<T> = std::result::Result<T, SpeedgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SpeedgateError::UnknownMetric {
            metric: "latency".to_string(),
            available: vec!["download_speed".to_string(), "jitter".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Metric 'latency' not found. Available metrics: [download_speed, jitter]"
        );
    }

    #[test]
    fn test_unknown_name_lists_alternatives() {
        let err = SpeedgateError::unknown_name("operator", "approx", &["eq", "neq", "lt"]);
        assert_eq!(
            err.to_string(),
            "Unknown operator: 'approx'. Valid values: eq, neq, lt"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validation_error() {
        let err = SpeedgateError::validation("data", "cannot aggregate empty data");
        assert_eq!(
            err.to_string(),
            "Validation failed: data: cannot aggregate empty data"
        );
        assert!(!err.is_configuration());
        assert!(err.is_user_recoverable());
    }

    #[test]
    fn test_suggestion() {
        let err = SpeedgateError::scope("no data found for iteration 4");
        assert_eq!(
            err.suggestion(),
            Some("Widen the window or check the iteration number")
        );
        let err = SpeedgateError::Config("bad".to_string());
        assert_eq!(err.suggestion(), None);
    }

    #[test]
    fn test_from_validation_errors_single_and_many() {
        let single = SpeedgateError::from_validation_errors(vec![ValidationError::new(
            "scenarios[0].id",
            "cannot be empty",
        )]);
        assert!(matches!(single, SpeedgateError::Validation { .. }));

        let many = SpeedgateError::from_validation_errors(vec![
            ValidationError::new("a", "x"),
            ValidationError::new("b", "y"),
        ]);
        assert_eq!(many.to_string(), "Validation errors: a: x; b: y");
    }
}

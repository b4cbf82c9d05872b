//! Structured error output for the `sg` binary and its callers.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction ("did you mean ...")
//! - Retryability flags
//! - Context for debugging

#![allow(clippy::option_if_let_else)]

use crate::error::SpeedgateError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Config Errors (exit code 2) ===
    /// Required expectation/scenario field missing
    MissingField,
    /// Metric has no recorded series
    UnknownMetric,
    /// Unrecognized method/operator/scope/mode name
    UnknownName,
    /// Configuration error
    ConfigError,
    /// Config file not found
    ConfigNotFound,

    // === Validation Errors (exit code 3) ===
    /// Field validation failed
    ValidationFailed,

    // === Scope Errors (exit code 4) ===
    /// No data in the requested window/iteration/range
    ScopeEmpty,

    // === Schedule Errors (exit code 5) ===
    /// Malformed schedule block
    ScheduleConfig,
    /// No executor registered for the protocol
    UnknownProtocol,
    /// External executor failed
    ExecutionFailed,

    // === I/O Errors (exit code 6) ===
    /// File I/O error
    IoError,
    /// JSON serialization error
    JsonError,
    /// YAML parsing error
    YamlError,

    // === Internal Errors (exit code 1) ===
    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "MISSING_FIELD",
            Self::UnknownMetric => "UNKNOWN_METRIC",
            Self::UnknownName => "UNKNOWN_NAME",
            Self::ConfigError => "CONFIG_ERROR",
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ScopeEmpty => "SCOPE_EMPTY",
            Self::ScheduleConfig => "SCHEDULE_CONFIG",
            Self::UnknownProtocol => "UNKNOWN_PROTOCOL",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Scope errors clear up once more measurements arrive; execution
    /// failures may be transient on the prober side.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ScopeEmpty | Self::ExecutionFailed)
    }

    /// Get the exit code for this error category.
    ///
    /// - 1: Internal/unknown errors
    /// - 2: Configuration errors
    /// - 3: Validation errors
    /// - 4: Scope errors
    /// - 5: Schedule errors
    /// - 6: I/O errors
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::MissingField
            | Self::UnknownMetric
            | Self::UnknownName
            | Self::ConfigError
            | Self::ConfigNotFound => 2,
            Self::ValidationFailed => 3,
            Self::ScopeEmpty => 4,
            Self::ScheduleConfig | Self::UnknownProtocol | Self::ExecutionFailed => 5,
            Self::IoError | Self::JsonError | Self::YamlError => 6,
            Self::InternalError => 1,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `SpeedgateError`.
    #[must_use]
    pub fn from_error(err: &SpeedgateError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);
        let hint = Self::generate_hint(err);

        Self {
            code,
            message: err.to_string(),
            hint,
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }

        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &SpeedgateError) -> (ErrorCode, Option<Value>) {
        match err {
            SpeedgateError::MissingField { field } => {
                (ErrorCode::MissingField, Some(json!({"field": field})))
            }
            SpeedgateError::UnknownMetric { metric, available } => (
                ErrorCode::UnknownMetric,
                Some(json!({"metric": metric, "available": available})),
            ),
            SpeedgateError::UnknownName { kind, name, valid } => (
                ErrorCode::UnknownName,
                Some(json!({
                    "kind": kind,
                    "provided": name,
                    "valid_values": valid.split(", ").collect::<Vec<_>>(),
                })),
            ),
            SpeedgateError::Config(_) => (ErrorCode::ConfigError, None),
            SpeedgateError::ConfigNotFound { path } => (
                ErrorCode::ConfigNotFound,
                Some(json!({"path": path.display().to_string()})),
            ),
            SpeedgateError::Validation { field, reason } => (
                ErrorCode::ValidationFailed,
                Some(json!({"field": field, "reason": reason})),
            ),
            SpeedgateError::ValidationErrors { errors } => (
                ErrorCode::ValidationFailed,
                Some(json!({
                    "errors": errors.iter()
                        .map(|e| json!({"field": e.field, "message": e.message}))
                        .collect::<Vec<_>>()
                })),
            ),
            SpeedgateError::Scope(_) => (ErrorCode::ScopeEmpty, None),
            SpeedgateError::ScheduleConfig { scenario_id, .. } => (
                ErrorCode::ScheduleConfig,
                Some(json!({"scenario_id": scenario_id})),
            ),
            SpeedgateError::UnknownProtocol { protocol, .. } => (
                ErrorCode::UnknownProtocol,
                Some(json!({"protocol": protocol})),
            ),
            SpeedgateError::Execution { scenario_id, .. } => (
                ErrorCode::ExecutionFailed,
                Some(json!({"scenario_id": scenario_id})),
            ),
            SpeedgateError::Io(_) => (ErrorCode::IoError, None),
            SpeedgateError::Json(_) => (ErrorCode::JsonError, None),
            SpeedgateError::Yaml(_) => (ErrorCode::YamlError, None),
            SpeedgateError::Other(_) => (ErrorCode::InternalError, None),
        }
    }

    fn generate_hint(err: &SpeedgateError) -> Option<String> {
        // A close match beats the generic suggestion.
        match err {
            SpeedgateError::UnknownName { name, valid, .. } => {
                let candidates: Vec<String> = valid.split(", ").map(str::to_string).collect();
                if let Some(closest) = find_similar_names(name, &candidates, 1).first() {
                    return Some(format!("Did you mean '{closest}'?"));
                }
            }
            SpeedgateError::UnknownMetric { metric, available } => {
                let similar = find_similar_names(metric, available, 3);
                if similar.len() == 1 {
                    return Some(format!("Did you mean '{}'?", similar[0]));
                } else if !similar.is_empty() {
                    return Some(format!("Did you mean one of: {}?", similar.join(", ")));
                }
            }
            _ => {}
        }

        err.suggestion().map(str::to_string)
    }
}

/// Calculate the Levenshtein distance between two strings.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

/// Find names similar to `searched` using Levenshtein distance.
///
/// Returns up to `max_suggestions` names with distance <= 3.
#[must_use]
pub fn find_similar_names(
    searched: &str,
    existing: &[String],
    max_suggestions: usize,
) -> Vec<String> {
    let searched = searched.to_lowercase();
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|name| (levenshtein_distance(&searched, name), name.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max_suggestions)
        .map(|(_, name)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::UnknownMetric.as_str(), "UNKNOWN_METRIC");
        assert_eq!(ErrorCode::ScopeEmpty.as_str(), "SCOPE_EMPTY");
    }

    #[test]
    fn test_error_code_exit_codes() {
        assert_eq!(ErrorCode::InternalError.exit_code(), 1);
        assert_eq!(ErrorCode::UnknownName.exit_code(), 2);
        assert_eq!(ErrorCode::ValidationFailed.exit_code(), 3);
        assert_eq!(ErrorCode::ScopeEmpty.exit_code(), 4);
        assert_eq!(ErrorCode::ScheduleConfig.exit_code(), 5);
        assert_eq!(ErrorCode::YamlError.exit_code(), 6);
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::ScopeEmpty.is_retryable());
        assert!(!ErrorCode::UnknownName.is_retryable());
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("gte", "gte"), 0);
        assert_eq!(levenshtein_distance("gtee", "gte"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_unknown_name_hint_suggests_closest() {
        let err = SpeedgateError::unknown_name(
            "aggregation method",
            "mediam",
            &["mean", "median", "p90", "p95", "p99"],
        );
        let structured = StructuredError::from_error(&err);
        assert_eq!(structured.code, ErrorCode::UnknownName);
        assert_eq!(structured.hint.as_deref(), Some("Did you mean 'median'?"));

        let err = SpeedgateError::unknown_name("aggregation method", "p59", &["mean", "p99"]);
        let structured = StructuredError::from_error(&err);
        assert_eq!(structured.hint.as_deref(), Some("Did you mean 'p99'?"));
    }

    #[test]
    fn test_unknown_metric_hint() {
        let err = SpeedgateError::UnknownMetric {
            metric: "download_sped".to_string(),
            available: vec!["download_speed".to_string(), "jitter".to_string()],
        };
        let structured = StructuredError::from_error(&err);
        assert_eq!(
            structured.hint.as_deref(),
            Some("Did you mean 'download_speed'?")
        );
    }

    #[test]
    fn test_structured_error_to_json() {
        let err = SpeedgateError::scope("No data points found in 60-minute window");
        let json = StructuredError::from_error(&err).to_json();
        assert_eq!(json["error"]["code"], "SCOPE_EMPTY");
        assert_eq!(json["error"]["retryable"], true);
    }

    #[test]
    fn test_to_human_output() {
        let err = SpeedgateError::MissingField {
            field: "operator".to_string(),
        };
        let human = StructuredError::from_error(&err).to_human(false);
        assert!(human.starts_with("Error: Configuration error: missing 'operator' field"));
        assert!(human.contains("Hint: "));
    }
}

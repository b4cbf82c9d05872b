//! Core data types for `speedgate`.
//!
//! This module defines the fundamental types used throughout the application:
//! - `DataPoint` - One time-stamped measured value
//! - `Expectation` - A declarative pass/fail rule as written in configuration
//! - `ExpectedValue` - Scalar, range, not-yet-coerced text, or anything else as written
//! - `EvaluationResult` - The immutable record of one evaluation
//! - `Verdict` - PASS / FAIL / ERROR
//! - `MeasurementRecord` - Raw prober output for one test run
//! - `ScenarioSummary` - Scenario-level verdict emitted after a job's final firing

use crate::error::{Result, SpeedgateError};
use crate::util::lenient;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Number of filtered values kept verbatim in an `EvaluationResult`.
pub const PREVIEW_LIMIT: usize = 10;

/// One measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl DataPoint {
    /// Create a point, rejecting NaN and infinities.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `value` is not finite.
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Result<Self> {
        if !value.is_finite() {
            return Err(SpeedgateError::validation(
                "value",
                format!("data point value must be finite, got {value}"),
            ));
        }
        Ok(Self {
            value,
            timestamp,
            iteration: None,
            metadata: Map::new(),
        })
    }

    /// Create a point stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `value` is not finite.
    pub fn now(value: f64) -> Result<Self> {
        Self::new(value, Utc::now())
    }

    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    #[must_use]
    pub fn with_iteration_opt(mut self, iteration: Option<u32>) -> Self {
        self.iteration = iteration;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Evaluation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Error,
}

impl Verdict {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    pub const fn from_passed(passed: bool) -> Self {
        if passed { Self::Pass } else { Self::Fail }
    }

    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = SpeedgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            "ERROR" => Ok(Self::Error),
            _ => Err(SpeedgateError::unknown_name(
                "verdict",
                s,
                &["PASS", "FAIL", "ERROR"],
            )),
        }
    }
}

/// Expected value of an expectation.
///
/// Text is what configuration gave us before coercion; see [`ExpectedValue::coerce`].
/// Any other shape is kept in `Other` and rejected when compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ExpectedValue {
    Scalar(f64),
    Range(f64, f64),
    Text(String),
    Other(Value),
}

impl ExpectedValue {
    /// Turn text into a number, or failing that a two-element `[min, max]`
    /// range. Anything else is returned unchanged.
    #[must_use]
    pub fn coerce(self) -> Self {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                if let Ok(number) = trimmed.parse::<f64>() {
                    return Self::Scalar(number);
                }
                match serde_json::from_str::<Vec<f64>>(trimmed) {
                    Ok(pair) if pair.len() == 2 => Self::Range(pair[0], pair[1]),
                    _ => Self::Text(text),
                }
            }
            other => other,
        }
    }

    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_range(&self) -> Option<(f64, f64)> {
        match self {
            Self::Range(min, max) => Some((*min, *max)),
            _ => None,
        }
    }
}

impl fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Range(min, max) => write!(f, "[{min}, {max}]"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<f64> for ExpectedValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<(f64, f64)> for ExpectedValue {
    fn from((min, max): (f64, f64)) -> Self {
        Self::Range(min, max)
    }
}

/// A declarative pass/fail rule, as loaded from configuration.
///
/// Every field is optional at this level so that a malformed entry fails
/// only its own evaluation; `metrics::ResolvedExpectation` is the checked form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Expectation {
    /// Metric name, e.g. `download_speed`
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub metric: Option<String>,
    /// Aggregation method (default `mean`)
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub aggregation: Option<String>,
    /// Comparison operator or alias
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub operator: Option<String>,
    /// Scalar or `[min, max]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ExpectedValue>,
    /// per_iteration | aggregate | windowed | scenario | cumulative_success_rate
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub evaluation_scope: Option<String>,
    /// Window size for the windowed scope (default 60)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<f64>")]
    pub window_minutes: Option<Value>,
    /// Absolute tolerance for eq/neq
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<f64>")]
    pub tolerance: Option<Value>,
    /// neither | both | left | right (between only)
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub inclusive: Option<String>,
    /// Free-text unit label
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub unit: Option<String>,
}

impl Expectation {
    /// Shorthand used by tests and embedding code.
    #[must_use]
    pub fn new(
        metric: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<ExpectedValue>,
    ) -> Self {
        Self {
            metric: Some(metric.into()),
            operator: Some(operator.into()),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn aggregation(mut self, method: impl Into<String>) -> Self {
        self.aggregation = Some(method.into());
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.evaluation_scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn window_minutes(mut self, minutes: f64) -> Self {
        self.window_minutes = Some(Value::from(minutes));
        self
    }

    #[must_use]
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(Value::from(tolerance));
        self
    }

    #[must_use]
    pub fn inclusive(mut self, mode: impl Into<String>) -> Self {
        self.inclusive = Some(mode.into());
        self
    }

    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Metric name for logs and ERROR records.
    #[must_use]
    pub fn metric_or_unknown(&self) -> &str {
        self.metric.as_deref().unwrap_or("unknown")
    }
}

/// Bounded diagnostic preview of the values an evaluation looked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValuePreview {
    Values(Vec<f64>),
    Summary(String),
}

impl ValuePreview {
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        if values.len() <= PREVIEW_LIMIT {
            Self::Values(values.to_vec())
        } else {
            Self::Summary(format!("{} values", values.len()))
        }
    }
}

/// Record of one evaluation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub metric: String,
    pub aggregation: String,
    pub evaluation_scope: String,
    pub operator: String,
    pub expected_value: Option<ExpectedValue>,
    pub actual_value: Option<f64>,
    pub unit: String,
    pub passed: bool,
    pub verdict: Verdict,
    pub timestamp: DateTime<Utc>,
    pub iteration: Option<u32>,
    pub data_points_evaluated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_values: Option<ValuePreview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
}

impl EvaluationResult {
    /// Build the ERROR record for an expectation that could not be evaluated.
    #[must_use]
    pub fn error(
        expectation: &Expectation,
        iteration: Option<u32>,
        err: &SpeedgateError,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            metric: expectation.metric_or_unknown().to_string(),
            aggregation: expectation
                .aggregation
                .clone()
                .unwrap_or_else(|| "mean".to_string()),
            evaluation_scope: expectation
                .evaluation_scope
                .clone()
                .unwrap_or_else(|| "aggregate".to_string()),
            operator: expectation.operator.clone().unwrap_or_default(),
            expected_value: expectation.value.clone(),
            actual_value: None,
            unit: expectation.unit.clone().unwrap_or_default(),
            passed: false,
            verdict: Verdict::Error,
            timestamp,
            iteration,
            data_points_evaluated: 0,
            raw_values: None,
            error: Some(err.to_string()),
            scenario_id: None,
        }
    }

    #[must_use]
    pub fn with_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = Some(scenario_id.into());
        self
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.verdict, Verdict::Error)
    }
}

/// Raw output of one prober run (one direction against one server).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    /// `download` or `upload`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<String>,
    /// `success`, `failed`, `timeout`, `parse_error`, `error`
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits_per_second: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmits: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_status() -> String {
    "success".to_string()
}

impl MeasurementRecord {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

/// Scenario-level verdict for one scenario-scoped expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario_id: String,
    pub metric: String,
    pub aggregation: String,
    pub actual_value: Option<f64>,
    pub sample_count: usize,
    pub passed: bool,
    pub verdict: Verdict,
}

impl ScenarioSummary {
    #[must_use]
    pub fn from_result(scenario_id: &str, result: &EvaluationResult) -> Self {
        Self {
            scenario_id: scenario_id.to_string(),
            metric: result.metric.clone(),
            aggregation: result.aggregation.clone(),
            actual_value: result.actual_value,
            sample_count: result.data_points_evaluated,
            passed: result.passed,
            verdict: result.verdict,
        }
    }
}

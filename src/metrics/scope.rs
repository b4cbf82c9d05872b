//! ScopeSelector: pick the slice of a metric's history one evaluation looks at.
//!
//! All selectors take canonical [`DataPoint`]s. Heterogeneous input is
//! normalized once, at ingestion (see `metrics::ingest`).

use crate::error::{Result, SpeedgateError};
use crate::model::DataPoint;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Window used by the windowed scope when an expectation gives none.
pub const DEFAULT_WINDOW_MINUTES: f64 = 60.0;

/// Default record key read by [`cumulative_success_rate`].
pub const DEFAULT_PASS_KEY: &str = "passed";

/// Closed set of evaluation scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    PerIteration,
    #[default]
    Aggregate,
    Windowed,
    /// Like `Aggregate`, but only evaluated after a job's final firing.
    Scenario,
    CumulativeSuccessRate,
}

impl Scope {
    pub const NAMES: &'static [&'static str] = &[
        "per_iteration",
        "aggregate",
        "windowed",
        "scenario",
        "cumulative_success_rate",
    ];

    pub const ALL: [Self; 5] = [
        Self::PerIteration,
        Self::Aggregate,
        Self::Windowed,
        Self::Scenario,
        Self::CumulativeSuccessRate,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PerIteration => "per_iteration",
            Self::Aggregate => "aggregate",
            Self::Windowed => "windowed",
            Self::Scenario => "scenario",
            Self::CumulativeSuccessRate => "cumulative_success_rate",
        }
    }

    /// Scopes evaluated only once a scenario has finished.
    #[must_use]
    pub const fn is_scenario_level(&self) -> bool {
        matches!(self, Self::Scenario)
    }

    #[must_use]
    pub fn describe(&self) -> ScopeInfo {
        let (display_name, description, use_case, parameters): (_, _, _, &[&str]) = match self {
            Self::PerIteration => (
                "Per Iteration",
                "Evaluates the result of the single current test run",
                "\"Did the website load under 5s right now?\"",
                &["iteration"],
            ),
            Self::Aggregate => (
                "Aggregate",
                "Evaluates all data points collected from the start until now",
                "\"Is the P95 load time under 5s for all tests run this week?\"",
                &["start_time (optional)", "end_time (optional)"],
            ),
            Self::Windowed => (
                "Windowed",
                "Evaluates data points within a rolling time window",
                "\"Is the network stable recently?\" (ignores failures from 3 days ago)",
                &["window_minutes", "reference_time (optional)"],
            ),
            Self::Scenario => (
                "Scenario",
                "Evaluates every data point once the scenario's final run is done",
                "\"Across the whole campaign, was P95 download above 80 Mbps?\"",
                &[],
            ),
            Self::CumulativeSuccessRate => (
                "Cumulative Success Rate",
                "Percentage of earlier evaluations of this metric that passed",
                "\"Did 99% of the individual tests pass?\"",
                &["pass_key (optional)"],
            ),
        };
        ScopeInfo {
            name: self.as_str(),
            display_name,
            description,
            use_case,
            parameters,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scope {
    type Err = SpeedgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "per_iteration" => Ok(Self::PerIteration),
            "aggregate" | "overall" => Ok(Self::Aggregate),
            "windowed" => Ok(Self::Windowed),
            "scenario" => Ok(Self::Scenario),
            "cumulative_success_rate" => Ok(Self::CumulativeSuccessRate),
            _ => Err(SpeedgateError::unknown_name(
                "evaluation scope",
                s,
                Self::NAMES,
            )),
        }
    }
}

/// Catalogue entry describing one scope.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub use_case: &'static str,
    pub parameters: &'static [&'static str],
}

/// One entry per scope, in display order.
#[must_use]
pub fn catalogue() -> Vec<ScopeInfo> {
    Scope::ALL.iter().map(Scope::describe).collect()
}

/// Scope-specific parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScopeParams {
    /// Current iteration for `per_iteration`.
    pub iteration: Option<u32>,
    /// Window size for `windowed`; [`DEFAULT_WINDOW_MINUTES`] when unset.
    pub window_minutes: Option<f64>,
    /// End of the window; now when unset.
    pub reference_time: Option<DateTime<Utc>>,
    /// Inclusive lower bound for `aggregate`.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound for `aggregate`.
    pub end_time: Option<DateTime<Utc>>,
}

impl ScopeParams {
    #[must_use]
    pub fn at_iteration(iteration: Option<u32>) -> Self {
        Self {
            iteration,
            ..Self::default()
        }
    }
}

/// Select values for `scope`.
///
/// # Errors
///
/// Propagates the selector's error; `cumulative_success_rate` is rejected
/// because it reads evaluation history, not a metric series.
pub fn select(scope: Scope, data: &[DataPoint], params: &ScopeParams) -> Result<Vec<f64>> {
    match scope {
        Scope::PerIteration => per_iteration(data, params.iteration),
        Scope::Aggregate | Scope::Scenario => aggregate(data, params.start_time, params.end_time),
        Scope::Windowed => windowed(
            data,
            params.window_minutes.unwrap_or(DEFAULT_WINDOW_MINUTES),
            params.reference_time.unwrap_or_else(Utc::now),
        ),
        Scope::CumulativeSuccessRate => Err(SpeedgateError::validation(
            "evaluation_scope",
            "cumulative_success_rate reads evaluation history, not metric values",
        )),
    }
}

/// Values recorded for one iteration.
///
/// Without an explicit `iteration`, the most recent point's iteration is
/// used; if no point carries one, only the most recent value is returned.
///
/// # Errors
///
/// Scope error when nothing matches; validation error when the series
/// mixes points with and without iteration numbers.
pub fn per_iteration(data: &[DataPoint], iteration: Option<u32>) -> Result<Vec<f64>> {
    let Some(last) = data.last() else {
        return Err(SpeedgateError::scope("no data points available"));
    };

    let with_iteration = data.iter().filter(|p| p.iteration.is_some()).count();
    if with_iteration != 0 && with_iteration != data.len() {
        return Err(SpeedgateError::validation(
            "data",
            format!(
                "ambiguous input: {with_iteration} of {} points carry an iteration number",
                data.len()
            ),
        ));
    }

    let target = match iteration.or(last.iteration) {
        Some(target) => target,
        None => {
            debug!("No iteration metadata; using most recent value");
            return Ok(vec![last.value]);
        }
    };

    let values: Vec<f64> = data
        .iter()
        .filter(|p| p.iteration == Some(target))
        .map(|p| p.value)
        .collect();
    if values.is_empty() {
        return Err(SpeedgateError::scope(format!(
            "no data points found for iteration {target}"
        )));
    }
    debug!(iteration = target, count = values.len(), "Selected per-iteration values");
    Ok(values)
}

/// Values with `start_time <= timestamp <= end_time`; either side may be open.
///
/// # Errors
///
/// Scope error when the filtered set is empty.
pub fn aggregate(
    data: &[DataPoint],
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
) -> Result<Vec<f64>> {
    let values: Vec<f64> = data
        .iter()
        .filter(|p| start_time.is_none_or(|start| p.timestamp >= start))
        .filter(|p| end_time.is_none_or(|end| p.timestamp <= end))
        .map(|p| p.value)
        .collect();
    if values.is_empty() {
        return Err(SpeedgateError::scope(
            "no data points found in the specified time range",
        ));
    }
    Ok(values)
}

/// Values with timestamp in `[reference_time - window, reference_time]`.
///
/// # Errors
///
/// Validation error for a non-positive or absurd window; scope error when
/// the window is empty.
pub fn windowed(
    data: &[DataPoint],
    window_minutes: f64,
    reference_time: DateTime<Utc>,
) -> Result<Vec<f64>> {
    if !window_minutes.is_finite() || window_minutes <= 0.0 {
        return Err(SpeedgateError::validation(
            "window_minutes",
            format!("must be greater than 0, got {window_minutes}"),
        ));
    }
    let window = TimeDelta::try_milliseconds((window_minutes * 60_000.0).round() as i64)
        .ok_or_else(|| {
            SpeedgateError::validation("window_minutes", format!("{window_minutes} is too large"))
        })?;
    let start = reference_time.checked_sub_signed(window).ok_or_else(|| {
        SpeedgateError::validation(
            "window_minutes",
            "window reaches before the supported time range",
        )
    })?;

    let values: Vec<f64> = data
        .iter()
        .filter(|p| p.timestamp >= start && p.timestamp <= reference_time)
        .map(|p| p.value)
        .collect();
    if values.is_empty() {
        return Err(SpeedgateError::scope(format!(
            "no data points found in {window_minutes}-minute window"
        )));
    }
    debug!(window_minutes, count = values.len(), "Selected windowed values");
    Ok(values)
}

/// Percentage of `results` whose `pass_key` field is truthy.
///
/// # Errors
///
/// Scope error on empty input; validation error when an entry is not an
/// object or lacks `pass_key`.
pub fn cumulative_success_rate(results: &[Value], pass_key: &str) -> Result<f64> {
    if results.is_empty() {
        return Err(SpeedgateError::scope(
            "cannot compute success rate from empty results",
        ));
    }

    let mut passed = 0usize;
    for (index, entry) in results.iter().enumerate() {
        let Value::Object(record) = entry else {
            return Err(SpeedgateError::validation(
                format!("results[{index}]"),
                "expected an object",
            ));
        };
        let flag = record.get(pass_key).ok_or_else(|| {
            SpeedgateError::validation(
                format!("results[{index}]"),
                format!("missing '{pass_key}' key"),
            )
        })?;
        if is_truthy(flag) {
            passed += 1;
        }
    }

    Ok(passed as f64 / results.len() as f64 * 100.0)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

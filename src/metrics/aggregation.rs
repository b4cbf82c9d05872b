//! Aggregator: reduce a numeric sequence to one statistic.
//!
//! Percentiles use linear interpolation between order statistics:
//! `rank = p / 100 * (n - 1)`, then the two neighbouring sorted values are
//! weighted by the fractional part of the rank.

use crate::error::{Result, SpeedgateError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Divisor used by standard deviation and variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Estimator {
    /// Divide by `n - 1`.
    #[default]
    Sample,
    /// Divide by `n`.
    Population,
}

/// Closed set of aggregation methods.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
    /// Percentile in `[0, 100]`.
    Percentile(f64),
    Min,
    Max,
    Sum,
    Count,
    StdDev(Estimator),
    Variance(Estimator),
    Range,
}

impl Aggregation {
    /// Every name accepted by [`Aggregation::from_str`] (besides `pNN`).
    pub const NAMES: &'static [&'static str] = &[
        "avg",
        "mean",
        "median",
        "p50",
        "p90",
        "p95",
        "p99",
        "min",
        "max",
        "sum",
        "count",
        "std_dev",
        "std_dev_population",
        "variance",
        "variance_population",
        "range",
    ];

    /// Canonical name of this method.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Mean => "mean".to_string(),
            Self::Median => "median".to_string(),
            Self::Percentile(p) => format!("p{p}"),
            Self::Min => "min".to_string(),
            Self::Max => "max".to_string(),
            Self::Sum => "sum".to_string(),
            Self::Count => "count".to_string(),
            Self::StdDev(Estimator::Sample) => "std_dev".to_string(),
            Self::StdDev(Estimator::Population) => "std_dev_population".to_string(),
            Self::Variance(Estimator::Sample) => "variance".to_string(),
            Self::Variance(Estimator::Population) => "variance_population".to_string(),
            Self::Range => "range".to_string(),
        }
    }

    /// Apply this method to `data`.
    ///
    /// # Errors
    ///
    /// Returns a validation error on non-finite input, on empty input (except
    /// for `sum` and `count`), and for sample std-dev/variance on fewer than
    /// two values.
    pub fn apply(&self, data: &[f64]) -> Result<f64> {
        match self {
            Self::Mean => mean(data),
            Self::Median => median(data),
            Self::Percentile(p) => percentile(data, *p),
            Self::Min => min(data),
            Self::Max => max(data),
            Self::Sum => sum(data),
            Self::Count => count(data).map(|n| n as f64),
            Self::StdDev(estimator) => std_dev(data, *estimator),
            Self::Variance(estimator) => variance(data, *estimator),
            Self::Range => range(data),
        }
    }

    /// Catalogue entry for `sg methods`.
    #[must_use]
    pub fn describe(&self) -> MethodInfo {
        let (display_name, description, use_case) = match self {
            Self::Mean => (
                "Mean (Average)",
                "Arithmetic mean",
                "Good for throughput; bad for latency (hides spikes)",
            ),
            Self::Median => (
                "Median (P50)",
                "The middle value",
                "Good for \"typical\" user experience",
            ),
            Self::Percentile(p) if (*p - 90.0).abs() < f64::EPSILON => {
                ("P90", "90th percentile", "Ignores the worst 10% of outliers")
            }
            Self::Percentile(p) if (*p - 95.0).abs() < f64::EPSILON => (
                "P95",
                "95th percentile",
                "Standard for SLAs. \"95% of users saw this speed.\"",
            ),
            Self::Percentile(p) if (*p - 99.0).abs() < f64::EPSILON => {
                ("P99", "99th percentile", "Strict performance monitoring")
            }
            Self::Percentile(_) => (
                "Percentile",
                "Linearly interpolated percentile",
                "Custom service-level thresholds",
            ),
            Self::Min => (
                "Minimum",
                "Minimum value",
                "\"What was the fastest we ever loaded?\"",
            ),
            Self::Max => ("Maximum", "Maximum value", "\"What was the worst lag spike?\""),
            Self::Sum => (
                "Sum",
                "Total sum",
                "Total bytes downloaded, total error count",
            ),
            Self::Count => ("Count", "Count of values", "Total number of tests run"),
            Self::StdDev(Estimator::Sample) => (
                "Standard Deviation",
                "Sample standard deviation (n - 1)",
                "How unstable/volatile is the network?",
            ),
            Self::StdDev(Estimator::Population) => (
                "Standard Deviation (population)",
                "Population standard deviation (n)",
                "Volatility over a complete, closed set of runs",
            ),
            Self::Variance(Estimator::Sample) => (
                "Variance",
                "Sample variance (std_dev squared)",
                "Spread of throughput across runs",
            ),
            Self::Variance(Estimator::Population) => (
                "Variance (population)",
                "Population variance",
                "Spread over a complete, closed set of runs",
            ),
            Self::Range => ("Range", "max - min", "Best-to-worst spread of a metric"),
        };
        MethodInfo {
            name: self.name(),
            display_name,
            description,
            use_case,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Aggregation {
    type Err = SpeedgateError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        let method = match normalized.as_str() {
            "avg" | "mean" | "average" => Self::Mean,
            "median" | "p50" => Self::Median,
            "min" => Self::Min,
            "max" => Self::Max,
            "sum" => Self::Sum,
            "count" => Self::Count,
            "std_dev" | "stddev" | "std" => Self::StdDev(Estimator::Sample),
            "std_dev_population" => Self::StdDev(Estimator::Population),
            "variance" | "var" => Self::Variance(Estimator::Sample),
            "variance_population" => Self::Variance(Estimator::Population),
            "range" => Self::Range,
            other => match parse_percentile_name(other) {
                Some(p) => Self::Percentile(p),
                None => {
                    return Err(SpeedgateError::unknown_name(
                        "aggregation method",
                        s,
                        Self::NAMES,
                    ));
                }
            },
        };
        Ok(method)
    }
}

/// `p90`, `p99.9` and friends.
fn parse_percentile_name(name: &str) -> Option<f64> {
    let p = name.strip_prefix('p')?.parse::<f64>().ok()?;
    ((0.0..=100.0).contains(&p)).then_some(p)
}

/// Catalogue entry describing one aggregation method.
#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub display_name: &'static str,
    pub description: &'static str,
    pub use_case: &'static str,
}

/// One entry per distinct method, in display order.
#[must_use]
pub fn catalogue() -> Vec<MethodInfo> {
    [
        Aggregation::Mean,
        Aggregation::Median,
        Aggregation::Percentile(90.0),
        Aggregation::Percentile(95.0),
        Aggregation::Percentile(99.0),
        Aggregation::Min,
        Aggregation::Max,
        Aggregation::Sum,
        Aggregation::Count,
        Aggregation::StdDev(Estimator::Sample),
        Aggregation::StdDev(Estimator::Population),
        Aggregation::Variance(Estimator::Sample),
        Aggregation::Variance(Estimator::Population),
        Aggregation::Range,
    ]
    .iter()
    .map(Aggregation::describe)
    .collect()
}

fn validate(data: &[f64], allow_empty: bool) -> Result<()> {
    if data.is_empty() && !allow_empty {
        return Err(SpeedgateError::validation(
            "data",
            "cannot aggregate empty data",
        ));
    }
    if let Some((index, value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(SpeedgateError::validation(
            "data",
            format!("element {index} is not finite ({value})"),
        ));
    }
    Ok(())
}

fn sorted(data: &[f64]) -> Vec<f64> {
    let mut values = data.to_vec();
    values.sort_by(f64::total_cmp);
    values
}

/// Arithmetic mean.
///
/// # Errors
///
/// Empty or non-finite input.
pub fn mean(data: &[f64]) -> Result<f64> {
    validate(data, false)?;
    Ok(data.iter().sum::<f64>() / data.len() as f64)
}

/// Median, defined as the 50th percentile.
///
/// # Errors
///
/// Empty or non-finite input.
pub fn median(data: &[f64]) -> Result<f64> {
    percentile(data, 50.0)
}

/// Linearly interpolated percentile, `p` in `[0, 100]`.
///
/// # Errors
///
/// Empty or non-finite input, or `p` outside `[0, 100]`.
pub fn percentile(data: &[f64], p: f64) -> Result<f64> {
    validate(data, false)?;
    if !(0.0..=100.0).contains(&p) {
        return Err(SpeedgateError::validation(
            "percentile",
            format!("must be between 0 and 100, got {p}"),
        ));
    }

    let values = sorted(data);
    let rank = p / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return Ok(values[lower]);
    }
    let weight = rank - lower as f64;
    Ok(values[lower].mul_add(1.0 - weight, values[upper] * weight))
}

/// Smallest value.
///
/// # Errors
///
/// Empty or non-finite input.
pub fn min(data: &[f64]) -> Result<f64> {
    validate(data, false)?;
    Ok(data.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Largest value.
///
/// # Errors
///
/// Empty or non-finite input.
pub fn max(data: &[f64]) -> Result<f64> {
    validate(data, false)?;
    Ok(data.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Sum; 0 on empty input.
///
/// # Errors
///
/// Non-finite input.
pub fn sum(data: &[f64]) -> Result<f64> {
    validate(data, true)?;
    Ok(data.iter().sum())
}

/// Number of values; 0 on empty input.
///
/// # Errors
///
/// Non-finite input.
pub fn count(data: &[f64]) -> Result<usize> {
    validate(data, true)?;
    Ok(data.len())
}

/// Variance with the chosen estimator.
///
/// # Errors
///
/// Empty or non-finite input, or fewer than two values for the sample estimator.
pub fn variance(data: &[f64], estimator: Estimator) -> Result<f64> {
    validate(data, false)?;
    let n = data.len();
    let divisor = match estimator {
        Estimator::Sample => {
            if n < 2 {
                return Err(SpeedgateError::validation(
                    "data",
                    "sample standard deviation requires at least 2 values",
                ));
            }
            (n - 1) as f64
        }
        Estimator::Population => n as f64,
    };
    let mean = data.iter().sum::<f64>() / n as f64;
    let squares: f64 = data.iter().map(|v| (v - mean).powi(2)).sum();
    Ok(squares / divisor)
}

/// Standard deviation with the chosen estimator.
///
/// # Errors
///
/// Same as [`variance`].
pub fn std_dev(data: &[f64], estimator: Estimator) -> Result<f64> {
    variance(data, estimator).map(f64::sqrt)
}

/// `max - min`.
///
/// # Errors
///
/// Empty or non-finite input.
pub fn range(data: &[f64]) -> Result<f64> {
    Ok(max(data)? - min(data)?)
}

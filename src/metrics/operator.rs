//! Comparator: evaluate a named predicate between an actual and expected value.

use crate::error::{Result, SpeedgateError};
use crate::model::ExpectedValue;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Canonical comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
}

impl Operator {
    /// Canonical names, listed in unknown-operator errors.
    pub const NAMES: &'static [&'static str] = &["eq", "neq", "lt", "lte", "gt", "gte", "between"];

    pub const ALL: [Self; 7] = [
        Self::Eq,
        Self::Neq,
        Self::Lt,
        Self::Lte,
        Self::Gt,
        Self::Gte,
        Self::Between,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Between => "between",
        }
    }

    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Between => "x < y < z",
        }
    }

    /// Operators that honour a tolerance.
    #[must_use]
    pub const fn uses_tolerance(&self) -> bool {
        matches!(self, Self::Eq | Self::Neq)
    }

    /// Operators that take a `[min, max]` range.
    #[must_use]
    pub const fn is_range(&self) -> bool {
        matches!(self, Self::Between)
    }

    #[must_use]
    pub fn describe(&self) -> OperatorInfo {
        let (display_name, description, use_case) = match self {
            Self::Eq => ("Equal To", "Equal to (within tolerance)", "HTTP Code eq 200"),
            Self::Neq => ("Not Equal To", "Not equal to", "Error Count neq 0"),
            Self::Lt => ("Less Than", "Less than", "Jitter lt 30ms"),
            Self::Lte => (
                "Less Than or Equal",
                "Less than or equal to",
                "Page Load lte 5000ms",
            ),
            Self::Gt => ("Greater Than", "Greater than", "Throughput gt 100Mbps"),
            Self::Gte => (
                "Greater Than or Equal",
                "Greater than or equal to",
                "Success Rate gte 95%",
            ),
            Self::Between => (
                "Between",
                "Inside a range",
                "Bitrate between [2000, 5000]",
            ),
        };
        OperatorInfo {
            name: self.as_str(),
            symbol: self.symbol(),
            display_name,
            description,
            use_case,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SpeedgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "eq" | "==" | "equals" => Ok(Self::Eq),
            "neq" | "!=" | "not_equals" => Ok(Self::Neq),
            "lt" | "<" | "less_than" => Ok(Self::Lt),
            "lte" | "<=" | "less_than_or_equal" => Ok(Self::Lte),
            "gt" | ">" | "greater_than" => Ok(Self::Gt),
            "gte" | ">=" | "greater_than_or_equal" => Ok(Self::Gte),
            "between" | "in_range" => Ok(Self::Between),
            _ => Err(SpeedgateError::unknown_name("operator", s, Self::NAMES)),
        }
    }
}

/// Which range bounds count as inside for `between`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inclusive {
    /// `min < x < max`
    #[default]
    Neither,
    /// `min <= x <= max`
    Both,
    /// `min <= x < max`
    Left,
    /// `min < x <= max`
    Right,
}

impl Inclusive {
    pub const NAMES: &'static [&'static str] = &["neither", "both", "left", "right"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neither => "neither",
            Self::Both => "both",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    #[must_use]
    pub fn contains(&self, value: f64, min: f64, max: f64) -> bool {
        match self {
            Self::Neither => min < value && value < max,
            Self::Both => min <= value && value <= max,
            Self::Left => min <= value && value < max,
            Self::Right => min < value && value <= max,
        }
    }
}

impl fmt::Display for Inclusive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Inclusive {
    type Err = SpeedgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "neither" => Ok(Self::Neither),
            "both" => Ok(Self::Both),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(SpeedgateError::unknown_name(
                "inclusive mode",
                s,
                Self::NAMES,
            )),
        }
    }
}

/// Operator parameters read from an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CompareOptions {
    /// Absolute tolerance for `eq`/`neq`. Zero means exact.
    pub tolerance: f64,
    /// Bound handling for `between`.
    pub inclusive: Inclusive,
}

impl CompareOptions {
    #[must_use]
    pub const fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            inclusive: Inclusive::Neither,
        }
    }

    #[must_use]
    pub const fn with_inclusive(inclusive: Inclusive) -> Self {
        Self {
            tolerance: 0.0,
            inclusive,
        }
    }
}

/// Catalogue entry describing one operator.
#[derive(Debug, Clone, Serialize)]
pub struct OperatorInfo {
    pub name: &'static str,
    pub symbol: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub use_case: &'static str,
}

/// One entry per operator, in display order.
#[must_use]
pub fn catalogue() -> Vec<OperatorInfo> {
    Operator::ALL.iter().map(Operator::describe).collect()
}

fn finite(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SpeedgateError::validation(
            field,
            format!("must be a finite number, got {value}"),
        ))
    }
}

fn expect_scalar(op: Operator, expected: &ExpectedValue) -> Result<f64> {
    match expected {
        ExpectedValue::Scalar(v) => finite("expected_value", *v),
        other => Err(SpeedgateError::validation(
            "expected_value",
            format!("operator '{op}' needs a single number, got {other}"),
        )),
    }
}

fn expect_range(expected: &ExpectedValue) -> Result<(f64, f64)> {
    let (min, max) = match expected {
        ExpectedValue::Range(min, max) => (*min, *max),
        other => {
            return Err(SpeedgateError::validation(
                "expected_value",
                format!(
                    "operator 'between' needs a [min, max] pair, got {other}. \
                     Valid operators: {}",
                    Operator::NAMES.join(", ")
                ),
            ));
        }
    };
    let min = finite("expected_value.min", min)?;
    let max = finite("expected_value.max", max)?;
    if min > max {
        return Err(SpeedgateError::validation(
            "expected_value",
            format!("range minimum {min} is greater than maximum {max}"),
        ));
    }
    Ok((min, max))
}

/// Evaluate `actual <op> expected`.
///
/// # Errors
///
/// Returns a validation error for non-finite input, a negative tolerance,
/// a scalar where a range is needed (or vice versa), and a range whose
/// minimum exceeds its maximum.
pub fn compare(
    actual: f64,
    op: Operator,
    expected: &ExpectedValue,
    options: CompareOptions,
) -> Result<bool> {
    let actual = finite("actual_value", actual)?;

    match op {
        Operator::Between => {
            let (min, max) = expect_range(expected)?;
            Ok(options.inclusive.contains(actual, min, max))
        }
        Operator::Eq | Operator::Neq => {
            let expected = expect_scalar(op, expected)?;
            let tolerance = finite("tolerance", options.tolerance)?;
            if tolerance < 0.0 {
                return Err(SpeedgateError::validation(
                    "tolerance",
                    format!("must not be negative, got {tolerance}"),
                ));
            }
            let within = (actual - expected).abs() <= tolerance;
            Ok(if op == Operator::Eq { within } else { !within })
        }
        Operator::Lt => Ok(actual < expect_scalar(op, expected)?),
        Operator::Lte => Ok(actual <= expect_scalar(op, expected)?),
        Operator::Gt => Ok(actual > expect_scalar(op, expected)?),
        Operator::Gte => Ok(actual >= expect_scalar(op, expected)?),
    }
}

/// Parse `op` (name or alias) and evaluate.
///
/// # Errors
///
/// Unknown operator names plus everything [`compare`] rejects.
pub fn compare_named(
    actual: f64,
    op: &str,
    expected: &ExpectedValue,
    options: CompareOptions,
) -> Result<bool> {
    compare(actual, op.parse()?, expected, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: f64, max: f64) -> ExpectedValue {
        ExpectedValue::Range(min, max)
    }

    fn between(x: f64, inclusive: Inclusive) -> bool {
        compare(
            x,
            Operator::Between,
            &range(2000.0, 5000.0),
            CompareOptions::with_inclusive(inclusive),
        )
        .unwrap()
    }

    #[test]
    fn test_between_inclusivity_modes() {
        assert!(between(2000.0, Inclusive::Both));
        assert!(!between(2000.0, Inclusive::Neither));
        assert!(between(2000.0, Inclusive::Left));
        assert!(between(5000.0, Inclusive::Right));
        assert!(!between(5000.0, Inclusive::Left));
        assert!(between(3000.0, Inclusive::default()));
    }

    #[test]
    fn test_eq_tolerance() {
        let expected = ExpectedValue::Scalar(200.0);
        let within_one = CompareOptions::with_tolerance(1.0);
        assert!(compare(200.5, Operator::Eq, &expected, within_one).unwrap());
        assert!(!compare(200.5, Operator::Eq, &expected, CompareOptions::default()).unwrap());
        assert!(compare(200.5, Operator::Neq, &expected, CompareOptions::default()).unwrap());
        assert!(!compare(200.5, Operator::Neq, &expected, within_one).unwrap());
    }

    #[test]
    fn test_ordering_operators() {
        let ten = ExpectedValue::Scalar(10.0);
        let opts = CompareOptions::default();
        assert!(compare(9.0, Operator::Lt, &ten, opts).unwrap());
        assert!(compare(10.0, Operator::Lte, &ten, opts).unwrap());
        assert!(!compare(10.0, Operator::Gt, &ten, opts).unwrap());
        assert!(compare(10.0, Operator::Gte, &ten, opts).unwrap());
    }

    #[test]
    fn test_aliases_resolve() {
        let cases = [
            ("==", Operator::Eq),
            ("!=", Operator::Neq),
            ("<", Operator::Lt),
            ("<=", Operator::Lte),
            (">", Operator::Gt),
            (">=", Operator::Gte),
            ("greater_than_or_equal", Operator::Gte),
            ("in_range", Operator::Between),
            ("EQUALS", Operator::Eq),
        ];
        for (alias, op) in cases {
            assert_eq!(alias.parse::<Operator>().unwrap(), op, "alias {alias}");
        }
    }

    #[test]
    fn test_unknown_operator_lists_valid() {
        let one = ExpectedValue::Scalar(1.0);
        let err = compare_named(1.0, "approx", &one, CompareOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown operator: 'approx'. Valid values: eq, neq, lt, lte, gt, gte, between"
        );
    }

    #[test]
    fn test_malformed_ranges() {
        let opts = CompareOptions::default();
        let err = compare(1.0, Operator::Between, &range(5.0, 1.0), opts).unwrap_err();
        assert!(err.to_string().contains("greater than maximum"));
        assert!(compare(1.0, Operator::Between, &ExpectedValue::Scalar(1.0), opts).is_err());
        assert!(compare(1.0, Operator::Gte, &range(0.0, 2.0), opts).is_err());
    }

    #[test]
    fn test_rejects_non_finite_and_negative_tolerance() {
        let one = ExpectedValue::Scalar(1.0);
        assert!(compare(f64::NAN, Operator::Eq, &one, CompareOptions::default()).is_err());
        assert!(compare(1.0, Operator::Eq, &one, CompareOptions::with_tolerance(-0.5)).is_err());
    }
}

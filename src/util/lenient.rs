//! Loosely typed configuration fields.
//!
//! Document loading never rejects a field for its shape. Fields are kept
//! as written and read here, where a bad value fails only the expectation
//! or job that owns it.

use crate::error::{Result, SpeedgateError};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize any value as optional text. Numbers and booleans are
/// rendered, arrays and objects keep their JSON text.
///
/// # Errors
///
/// Only if the underlying format itself is unreadable.
pub fn string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// Read an optional number given as a JSON number or numeric text.
///
/// # Errors
///
/// Returns a validation error naming `field` for anything else.
pub fn number(field: &str, value: Option<&Value>) -> Result<Option<f64>> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| invalid(field, "a number", value))
}

/// Read an optional whole number that fits `T`, given as a JSON number or
/// digits.
///
/// # Errors
///
/// Returns a validation error naming `field` for fractions, negatives,
/// out-of-range values and non-numeric input.
pub fn whole<T: TryFrom<u64>>(field: &str, value: Option<&Value>) -> Result<Option<T>> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    parsed
        .and_then(|n| T::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| invalid(field, "a whole number", value))
}

fn invalid(field: &str, wanted: &str, value: Option<&Value>) -> SpeedgateError {
    let shown = value.map_or_else(|| "nothing".to_string(), Value::to_string);
    SpeedgateError::validation(field, format!("expected {wanted}, got {shown}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Labels {
        #[serde(default, deserialize_with = "string")]
        name: Option<String>,
    }

    #[test]
    fn test_string_accepts_any_shape() {
        let parse = |doc: &str| serde_json::from_str::<Labels>(doc).unwrap().name;
        assert_eq!(parse(r#"{"name": "mean"}"#), Some("mean".to_string()));
        assert_eq!(parse(r#"{"name": 95}"#), Some("95".to_string()));
        assert_eq!(parse(r#"{"name": [1, 2]}"#), Some("[1,2]".to_string()));
        assert_eq!(parse(r#"{"name": null}"#), None);
        assert_eq!(parse("{}"), None);
    }

    #[test]
    fn test_number_reads_numbers_and_numeric_text() {
        assert_eq!(number("tolerance", None).unwrap(), None);
        assert_eq!(number("tolerance", Some(&json!(0.5))).unwrap(), Some(0.5));
        assert_eq!(number("tolerance", Some(&json!(" 2 "))).unwrap(), Some(2.0));
        let err = number("tolerance", Some(&json!("loose"))).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
        assert!(number("tolerance", Some(&json!([1]))).is_err());
    }

    #[test]
    fn test_whole_rejects_fractions_and_overflow() {
        assert_eq!(whole::<u32>("max_runs", Some(&json!(4))).unwrap(), Some(4));
        assert_eq!(whole::<u32>("max_runs", Some(&json!("4"))).unwrap(), Some(4));
        assert!(whole::<u32>("max_runs", Some(&json!(1.5))).is_err());
        assert!(whole::<u32>("max_runs", Some(&json!(-1))).is_err());
        assert!(whole::<u32>("max_runs", Some(&json!(u64::MAX))).is_err());
        assert!(whole::<u64>("interval", Some(&json!(true))).is_err());
    }
}

//! Time-of-day, weekday and start-time parsing for schedule blocks.

use crate::error::{Result, SpeedgateError};
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};

/// Parse `HH:MM` or `HH:MM:SS` (24-hour clock).
///
/// # Errors
///
/// Returns a validation error naming `field_name` if the time is malformed.
pub fn parse_time_of_day(s: &str, field_name: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| {
            SpeedgateError::validation(
                field_name,
                format!("invalid time of day '{s}' (expected HH:MM)"),
            )
        })
}

pub const WEEKDAY_NAMES: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Parse a weekday name, full or three-letter, case-insensitive.
///
/// # Errors
///
/// Returns an unknown-name error listing the full day names.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    match s.trim().to_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        _ => Err(SpeedgateError::unknown_name("day", s, WEEKDAY_NAMES)),
    }
}

/// Lowercase full name of a weekday.
#[must_use]
pub const fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Parse a scenario `start_time`.
///
/// Supports:
/// - `immediate` or empty: no delay (`None`)
/// - Relative offsets: `+30s`, `+5m`, `+2h`, `+1d`
/// - RFC3339: `2025-01-15T10:30:00Z`
/// - Local ISO datetime: `2025-01-15T10:30:00`
///
/// # Errors
///
/// Returns a validation error if the value matches none of the forms.
pub fn parse_start_time(s: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("immediate") {
        return Ok(None);
    }

    if let Some(rest) = s.strip_prefix('+') {
        let invalid = || {
            SpeedgateError::validation(
                "start_time",
                format!("invalid relative start '{s}' (use +Ns, +Nm, +Nh or +Nd)"),
            )
        };
        let unit = rest.chars().last().ok_or_else(invalid)?;
        let amount: i64 = rest[..rest.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        let delta = match unit {
            's' => TimeDelta::try_seconds(amount),
            'm' => TimeDelta::try_minutes(amount),
            'h' => TimeDelta::try_hours(amount),
            'd' => TimeDelta::try_days(amount),
            _ => None,
        }
        .ok_or_else(invalid)?;
        return now.checked_add_signed(delta).map(Some).ok_or_else(invalid);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|_| {
            SpeedgateError::validation("start_time", format!("invalid start time '{s}'"))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| Some(local.with_timezone(&Utc)))
        .ok_or_else(|| {
            SpeedgateError::validation("start_time", format!("'{s}' does not exist in local time"))
        })
}

/// Render a timestamp in local time for status tables.
#[must_use]
pub fn format_local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_time_of_day() {
        let t = parse_time_of_day("09:30", "time").unwrap();
        assert_eq!((t.hour(), t.minute()), (9, 30));
        assert!(parse_time_of_day("23:59:59", "time").is_ok());
        assert!(parse_time_of_day("25:00", "time").is_err());
        assert!(parse_time_of_day("noon", "time").is_err());
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("Monday").unwrap(), Weekday::Mon);
        assert_eq!(parse_weekday("fri").unwrap(), Weekday::Fri);
        let err = parse_weekday("funday").unwrap_err();
        assert!(err.to_string().contains("monday, tuesday"));
        assert_eq!(weekday_name(Weekday::Sun), "sunday");
    }

    #[test]
    fn test_parse_start_time_forms() {
        let now = Utc::now();
        assert_eq!(parse_start_time("immediate", now).unwrap(), None);
        assert_eq!(parse_start_time("", now).unwrap(), None);
        assert_eq!(
            parse_start_time("+5m", now).unwrap(),
            Some(now + TimeDelta::minutes(5))
        );
        assert_eq!(
            parse_start_time("+2h", now).unwrap(),
            Some(now + TimeDelta::hours(2))
        );
        let fixed = parse_start_time("2025-01-15T10:30:00Z", now).unwrap().unwrap();
        assert_eq!(fixed.to_rfc3339(), "2025-01-15T10:30:00+00:00");
        assert!(parse_start_time("2025-01-15T10:30:00", now).unwrap().is_some());
    }

    #[test]
    fn test_parse_start_time_invalid() {
        let now = Utc::now();
        assert!(parse_start_time("+5x", now).is_err());
        assert!(parse_start_time("+m", now).is_err());
        assert!(parse_start_time("+", now).is_err());
        assert!(parse_start_time("soon", now).is_err());
    }
}

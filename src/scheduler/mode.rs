//! Schedule modes: parsing the schedule block and computing run times.

use crate::error::{Result, SpeedgateError};
use crate::util::lenient;
use crate::util::time::{parse_time_of_day, parse_weekday, weekday_name};
use chrono::{
    DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone, Timelike, Utc, Weekday,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Minutes between recurring runs when the block gives none.
pub const DEFAULT_RECURRING_INTERVAL: u64 = 60;
/// Daily/weekly run time when the block gives none.
pub const DEFAULT_TIME_OF_DAY: &str = "09:00";

/// Schedule block as written in a scenario.
///
/// Fields are kept as written; [`ScheduleMode::from_config`] reads them, so
/// a wrongly typed field fails only this scenario's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleConfig {
    /// once | recurring | every | daily | weekly | hourly | cron | custom (default once)
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub mode: Option<String>,
    /// Interval for `every`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<u64>")]
    pub interval: Option<Value>,
    /// seconds | minutes | hours | days | weeks (default minutes)
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub unit: Option<String>,
    /// HH:MM for `daily` and `weekly` (default 09:00)
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<String>,
    /// Weekday for `weekly` (default monday)
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub day: Option<String>,
    /// Minute past the hour for `hourly` (default 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<u32>")]
    pub minute: Option<Value>,
    /// Run cap for every/daily/weekly/hourly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<u32>")]
    pub max_runs: Option<Value>,
    /// Minutes between runs for `recurring` (default 60)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<u64>")]
    pub recurring_interval: Option<Value>,
    /// Number of runs for `recurring` (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<u32>")]
    pub recurring_times: Option<Value>,
    /// Expression handed to an external cron scheduler
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub cron: Option<String>,
    /// immediate | +Nm | ISO datetime
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<String>,
}

/// Unit for `every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    pub const NAMES: &'static [&'static str] = &["seconds", "minutes", "hours", "days", "weeks"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
        }
    }

    /// `amount` of this unit, or `None` if it overflows.
    #[must_use]
    pub fn span(&self, amount: u64) -> Option<TimeDelta> {
        let amount = i64::try_from(amount).ok()?;
        match self {
            Self::Seconds => TimeDelta::try_seconds(amount),
            Self::Minutes => TimeDelta::try_minutes(amount),
            Self::Hours => TimeDelta::try_hours(amount),
            Self::Days => TimeDelta::try_days(amount),
            Self::Weeks => TimeDelta::try_weeks(amount),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = SpeedgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "second" | "seconds" => Ok(Self::Seconds),
            "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            "week" | "weeks" => Ok(Self::Weeks),
            _ => Err(SpeedgateError::unknown_name("time unit", s, Self::NAMES)),
        }
    }
}

/// How due firings within one tick are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One firing at a time, in due order.
    #[default]
    Sequential,
    /// Due firings of distinct scenarios run on their own threads.
    Concurrent,
}

impl ExecutionMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = SpeedgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            _ => Err(SpeedgateError::unknown_name(
                "execution mode",
                s,
                &["sequential", "concurrent"],
            )),
        }
    }
}

/// Parsed schedule mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleMode {
    Once,
    Recurring {
        interval_minutes: u64,
        times: u32,
    },
    Every {
        interval: u64,
        unit: TimeUnit,
        max_runs: Option<u32>,
    },
    Daily {
        time: NaiveTime,
        max_runs: Option<u32>,
    },
    Weekly {
        day: Weekday,
        time: NaiveTime,
        max_runs: Option<u32>,
    },
    Hourly {
        minute: u32,
        max_runs: Option<u32>,
    },
    /// Run by an external cron scheduler; never fired here.
    Cron { expression: Option<String> },
}

impl ScheduleMode {
    pub const NAMES: &'static [&'static str] = &[
        "once",
        "recurring",
        "every",
        "daily",
        "weekly",
        "hourly",
        "cron",
        "custom",
    ];

    /// Parse a schedule block.
    ///
    /// # Errors
    ///
    /// `ScheduleConfig` for an unknown mode, unit or day, a malformed time,
    /// a non-numeric or zero interval or cap, and for the reserved `custom`
    /// mode.
    pub fn from_config(config: &ScheduleConfig, scenario_id: &str) -> Result<Self> {
        let fail = |reason: String| SpeedgateError::ScheduleConfig {
            scenario_id: scenario_id.to_string(),
            reason,
        };
        let whole_u32 = |field: &str, value: Option<&Value>| {
            lenient::whole::<u32>(field, value).map_err(|e| fail(e.to_string()))
        };
        let whole_u64 = |field: &str, value: Option<&Value>| {
            lenient::whole::<u64>(field, value).map_err(|e| fail(e.to_string()))
        };
        let max_runs = match whole_u32("max_runs", config.max_runs.as_ref())? {
            Some(0) => return Err(fail("max_runs must be at least 1".to_string())),
            other => other,
        };
        let time = || {
            parse_time_of_day(config.time.as_deref().unwrap_or(DEFAULT_TIME_OF_DAY), "time")
                .map_err(|e| fail(e.to_string()))
        };

        let mode = config.mode.as_deref().unwrap_or("once").trim().to_lowercase();
        match mode.as_str() {
            "once" => Ok(Self::Once),
            "recurring" => {
                let interval_minutes =
                    whole_u64("recurring_interval", config.recurring_interval.as_ref())?
                        .unwrap_or(DEFAULT_RECURRING_INTERVAL);
                let times =
                    whole_u32("recurring_times", config.recurring_times.as_ref())?.unwrap_or(1);
                if interval_minutes == 0 {
                    return Err(fail("recurring_interval must be at least 1".to_string()));
                }
                if times == 0 {
                    return Err(fail("recurring_times must be at least 1".to_string()));
                }
                Ok(Self::Recurring {
                    interval_minutes,
                    times,
                })
            }
            "every" => {
                let interval = whole_u64("interval", config.interval.as_ref())?.unwrap_or(1);
                let unit: TimeUnit = config
                    .unit
                    .as_deref()
                    .unwrap_or("minutes")
                    .parse()
                    .map_err(|e: SpeedgateError| fail(e.to_string()))?;
                if interval == 0 || unit.span(interval).is_none() {
                    return Err(fail(format!("invalid interval {interval} {unit}")));
                }
                Ok(Self::Every {
                    interval,
                    unit,
                    max_runs,
                })
            }
            "daily" => Ok(Self::Daily {
                time: time()?,
                max_runs,
            }),
            "weekly" => {
                let day = parse_weekday(config.day.as_deref().unwrap_or("monday"))
                    .map_err(|e| fail(e.to_string()))?;
                Ok(Self::Weekly {
                    day,
                    time: time()?,
                    max_runs,
                })
            }
            "hourly" => {
                let minute = whole_u32("minute", config.minute.as_ref())?.unwrap_or(0);
                if minute > 59 {
                    return Err(fail(format!("minute must be 0-59, got {minute}")));
                }
                Ok(Self::Hourly { minute, max_runs })
            }
            "cron" => Ok(Self::Cron {
                expression: config.cron.clone(),
            }),
            "custom" => Err(fail(
                "custom schedules are reserved and not supported".to_string(),
            )),
            _ => Err(fail(
                SpeedgateError::unknown_name("schedule mode", mode.as_str(), Self::NAMES)
                    .to_string(),
            )),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Recurring { .. } => "recurring",
            Self::Every { .. } => "every",
            Self::Daily { .. } => "daily",
            Self::Weekly { .. } => "weekly",
            Self::Hourly { .. } => "hourly",
            Self::Cron { .. } => "cron",
        }
    }

    /// Run cap: 1 for once, the repeat count for recurring, otherwise the
    /// optional explicit cap.
    #[must_use]
    pub const fn max_runs(&self) -> Option<u32> {
        match self {
            Self::Once => Some(1),
            Self::Recurring { times, .. } => Some(*times),
            Self::Every { max_runs, .. }
            | Self::Daily { max_runs, .. }
            | Self::Weekly { max_runs, .. }
            | Self::Hourly { max_runs, .. } => *max_runs,
            Self::Cron { .. } => None,
        }
    }

    /// Modes that repeat on a fixed interval.
    #[must_use]
    pub const fn is_interval(&self) -> bool {
        matches!(self, Self::Recurring { .. } | Self::Every { .. })
    }

    fn interval(&self) -> Option<TimeDelta> {
        match self {
            Self::Recurring {
                interval_minutes, ..
            } => TimeUnit::Minutes.span(*interval_minutes),
            Self::Every { interval, unit, .. } => unit.span(*interval),
            _ => None,
        }
    }

    /// First run for a job scheduled at `start`: immediately for once, one
    /// interval later for every/recurring, the next wall-clock match for
    /// daily/weekly/hourly. `None` for cron.
    #[must_use]
    pub fn first_run(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Once => Some(start),
            _ => self.next_after(start),
        }
    }

    /// Next run strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Once | Self::Cron { .. } => None,
            Self::Recurring { .. } | Self::Every { .. } => {
                after.checked_add_signed(self.interval()?)
            }
            Self::Daily { time, .. } => next_local(after, |date| Some(date.and_time(*time)), 2),
            Self::Weekly { day, time, .. } => next_local(
                after,
                |date| (date.weekday() == *day).then(|| date.and_time(*time)),
                15,
            ),
            Self::Hourly { minute, .. } => {
                let local = after.with_timezone(&Local);
                let base = local.date_naive().and_hms_opt(local.hour(), *minute, 0)?;
                (0..=48)
                    .filter_map(|h| base.checked_add_signed(TimeDelta::hours(h)))
                    .filter_map(|naive| Local.from_local_datetime(&naive).earliest())
                    .map(|dt| dt.with_timezone(&Utc))
                    .find(|dt| *dt > after)
            }
        }
    }

    /// Short human description, used in logs and status output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Once => "once".to_string(),
            Self::Recurring {
                interval_minutes,
                times,
            } => format!("{times} times every {interval_minutes} minutes"),
            Self::Every { interval, unit, .. } => format!("every {interval} {unit}"),
            Self::Daily { time, .. } => format!("daily at {}", time.format("%H:%M")),
            Self::Weekly { day, time, .. } => {
                format!("every {} at {}", weekday_name(*day), time.format("%H:%M"))
            }
            Self::Hourly { minute, .. } => format!("hourly at minute {minute}"),
            Self::Cron { expression } => format!(
                "cron {}",
                expression.as_deref().unwrap_or("(external)")
            ),
        }
    }
}

/// Earliest local datetime produced by `candidate` for today or one of the
/// following `days` days that lies strictly after `after`.
fn next_local(
    after: DateTime<Utc>,
    candidate: impl Fn(NaiveDate) -> Option<chrono::NaiveDateTime>,
    days: u64,
) -> Option<DateTime<Utc>> {
    let today = after.with_timezone(&Local).date_naive();
    today
        .iter_days()
        .take(usize::try_from(days).unwrap_or(usize::MAX))
        .filter_map(candidate)
        .filter_map(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .find(|dt| *dt > after)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: &str) -> ScheduleConfig {
        ScheduleConfig {
            mode: Some(mode.to_string()),
            ..ScheduleConfig::default()
        }
    }

    #[test]
    fn test_defaults_and_max_runs() {
        let once = ScheduleMode::from_config(&ScheduleConfig::default(), "s").unwrap();
        assert_eq!(once, ScheduleMode::Once);
        assert_eq!(once.max_runs(), Some(1));

        let recurring = ScheduleMode::from_config(&config("recurring"), "s").unwrap();
        assert_eq!(
            recurring,
            ScheduleMode::Recurring {
                interval_minutes: 60,
                times: 1
            }
        );

        let every = ScheduleMode::from_config(&config("every"), "s").unwrap();
        assert_eq!(every.max_runs(), None);
        assert_eq!(every.describe(), "every 1 minutes");
    }

    #[test]
    fn test_every_units_accept_singular() {
        let block = ScheduleConfig {
            interval: Some(Value::from(2)),
            unit: Some("Hour".to_string()),
            max_runs: Some(Value::from(4)),
            ..config("every")
        };
        let mode = ScheduleMode::from_config(&block, "s").unwrap();
        assert_eq!(
            mode,
            ScheduleMode::Every {
                interval: 2,
                unit: TimeUnit::Hours,
                max_runs: Some(4)
            }
        );
        let start = Utc::now();
        assert_eq!(mode.first_run(start), Some(start + TimeDelta::hours(2)));
    }

    #[test]
    fn test_rejected_blocks() {
        let unknown_unit = ScheduleConfig {
            unit: Some("fortnights".to_string()),
            ..config("every")
        };
        let err = ScheduleMode::from_config(&unknown_unit, "s1").unwrap_err();
        assert!(matches!(err, SpeedgateError::ScheduleConfig { .. }));
        assert!(err.to_string().contains("fortnights"));

        assert!(ScheduleMode::from_config(&config("custom"), "s").is_err());
        let err = ScheduleMode::from_config(&config("monthly"), "s").unwrap_err();
        assert!(err.to_string().contains("once, recurring, every"));

        let bad_day = ScheduleConfig {
            day: Some("funday".to_string()),
            ..config("weekly")
        };
        assert!(ScheduleMode::from_config(&bad_day, "s").is_err());

        let zero_cap = ScheduleConfig {
            max_runs: Some(Value::from(0)),
            ..config("daily")
        };
        assert!(ScheduleMode::from_config(&zero_cap, "s").is_err());

        let bad_minute = ScheduleConfig {
            minute: Some(Value::from(75)),
            ..config("hourly")
        };
        assert!(ScheduleMode::from_config(&bad_minute, "s").is_err());
    }

    #[test]
    fn test_wrongly_typed_fields_fail_only_this_block() {
        let blocks: Vec<ScheduleConfig> = serde_json::from_str(
            r#"[
                {"mode": "every", "interval": "often"},
                {"mode": "recurring", "recurring_times": 2.5},
                {"mode": "daily", "max_runs": -1},
                {"mode": "recurring", "recurring_interval": "5", "recurring_times": 3}
            ]"#,
        )
        .unwrap();

        for block in &blocks[..3] {
            let err = ScheduleMode::from_config(block, "s").unwrap_err();
            assert!(matches!(err, SpeedgateError::ScheduleConfig { .. }), "{err}");
        }
        let err = ScheduleMode::from_config(&blocks[0], "s").unwrap_err();
        assert!(err.to_string().contains("\"often\""), "{err}");

        assert_eq!(
            ScheduleMode::from_config(&blocks[3], "s").unwrap(),
            ScheduleMode::Recurring {
                interval_minutes: 5,
                times: 3
            }
        );
    }

    #[test]
    fn test_once_fires_at_start_and_never_again() {
        let start = Utc::now();
        assert_eq!(ScheduleMode::Once.first_run(start), Some(start));
        assert_eq!(ScheduleMode::Once.next_after(start), None);
    }

    #[test]
    fn test_daily_next_run_is_within_a_day() {
        let mode = ScheduleMode::from_config(&config("daily"), "s").unwrap();
        let now = Utc::now();
        let next = mode.next_after(now).unwrap();
        assert!(next > now);
        assert!(next - now <= TimeDelta::hours(25));
        let local = next.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute()), (9, 0));
    }

    #[test]
    fn test_weekly_lands_on_requested_day() {
        let block = ScheduleConfig {
            day: Some("friday".to_string()),
            time: Some("18:30".to_string()),
            ..config("weekly")
        };
        let mode = ScheduleMode::from_config(&block, "s").unwrap();
        let now = Utc::now();
        let next = mode.next_after(now).unwrap();
        let local = next.with_timezone(&Local);
        assert_eq!(local.weekday(), Weekday::Fri);
        assert!(next - now <= TimeDelta::days(8));
    }

    #[test]
    fn test_hourly_lands_on_minute() {
        let block = ScheduleConfig {
            minute: Some(Value::from("15")),
            ..config("hourly")
        };
        let mode = ScheduleMode::from_config(&block, "s").unwrap();
        let now = Utc::now();
        let next = mode.next_after(now).unwrap();
        assert!(next > now);
        assert!(next - now <= TimeDelta::hours(2));
        assert_eq!(next.with_timezone(&Local).minute(), 15);
    }

    #[test]
    fn test_cron_is_never_fired() {
        let mode = ScheduleMode::from_config(&config("cron"), "s").unwrap();
        assert_eq!(mode.first_run(Utc::now()), None);
        assert_eq!(mode.max_runs(), None);
    }

    #[test]
    fn test_execution_mode_parse() {
        assert_eq!(
            "Concurrent".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::Concurrent
        );
        assert!("parallel".parse::<ExecutionMode>().is_err());
    }
}

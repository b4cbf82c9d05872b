//! Shared utilities for `speedgate`.
//!
//! - Time-of-day and weekday parsing for schedule blocks
//! - Start-time parsing (`immediate`, `+5m`, ISO datetimes)
//! - Loosely typed configuration fields

pub mod lenient;
pub mod time;

pub use time::{format_local, parse_start_time, parse_time_of_day, parse_weekday, weekday_name};

//! Per-scenario job state machine.
//!
//! ```text
//! Registered ──schedule──► Scheduled ──fire × max_runs──► Completed
//!      │                       │
//!      │                       └──cancel──► Cancelled
//!      └──malformed block──► FailedToSchedule
//! ```

use super::mode::ScheduleMode;
use crate::config::Scenario;
use crate::util::time::format_local;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Registered,
    Scheduled,
    Completed,
    FailedToSchedule,
    /// Trigger released by a stop before the job completed.
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::FailedToSchedule => "failed_to_schedule",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scheduled invocation handed to a test executor.
#[derive(Debug, Clone)]
pub struct Firing {
    pub scenario: Arc<Scenario>,
    /// 1-based run number, used as the evaluation iteration.
    pub run_number: u32,
    pub max_runs: Option<u32>,
    pub fired_at: DateTime<Utc>,
}

impl Firing {
    #[must_use]
    pub fn scenario_id(&self) -> &str {
        &self.scenario.id
    }

    /// The last firing of a bounded job.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.max_runs == Some(self.run_number)
    }

    /// `n/max` or `n/unlimited`, as logged.
    #[must_use]
    pub fn progress(&self) -> String {
        self.max_runs.map_or_else(
            || format!("{}/unlimited", self.run_number),
            |max| format!("{}/{max}", self.run_number),
        )
    }
}

/// A scenario's job: schedule, counters and trigger.
///
/// `next_run` is the installed trigger; `None` means no trigger.
#[derive(Debug, Clone)]
pub struct ScheduleJob {
    scenario: Arc<Scenario>,
    mode: Option<ScheduleMode>,
    state: JobState,
    run_count: u32,
    max_runs: Option<u32>,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl ScheduleJob {
    #[must_use]
    pub fn register(scenario: Arc<Scenario>) -> Self {
        Self {
            scenario,
            mode: None,
            state: JobState::Registered,
            run_count: 0,
            max_runs: None,
            last_run: None,
            next_run: None,
            error: None,
        }
    }

    /// Parse the schedule block and install the first trigger.
    ///
    /// A malformed block moves the job to `FailedToSchedule` and is
    /// reported as `false`; the reason is kept for status output.
    pub fn schedule(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != JobState::Registered {
            return self.state == JobState::Scheduled;
        }
        let parsed = self.scenario.schedule_mode().and_then(|mode| {
            let start = self.scenario.start_time(now)?;
            Ok((mode, start))
        });
        match parsed {
            Ok((mode, start)) => {
                let first = match start {
                    Some(at) if mode.is_interval() || mode == ScheduleMode::Once => Some(at),
                    Some(at) => mode.first_run(at),
                    None => mode.first_run(now),
                };
                self.max_runs = mode.max_runs();
                self.next_run = first;
                self.state = JobState::Scheduled;
                tracing::info!(
                    scenario_id = %self.scenario.id,
                    schedule = %mode.describe(),
                    next_run = ?first,
                    "Scheduled scenario"
                );
                self.mode = Some(mode);
                true
            }
            Err(err) => {
                tracing::warn!(
                    scenario_id = %self.scenario.id,
                    error = %err,
                    "Failed to schedule scenario"
                );
                self.error = Some(err.to_string());
                self.state = JobState::FailedToSchedule;
                false
            }
        }
    }

    /// Scheduled with a trigger at or before `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Scheduled && self.next_run.is_some_and(|at| at <= now)
    }

    /// Count a firing. Reaching `max_runs` completes the job and removes
    /// its trigger in the same step, so a completed job can never fire again.
    pub fn begin_firing(&mut self, now: DateTime<Utc>) -> Firing {
        self.run_count = self.run_count.saturating_add(1);
        self.last_run = Some(now);
        if self.max_runs.is_some_and(|max| self.run_count >= max) {
            self.state = JobState::Completed;
            self.next_run = None;
        }
        Firing {
            scenario: Arc::clone(&self.scenario),
            run_number: self.run_count,
            max_runs: self.max_runs,
            fired_at: now,
        }
    }

    /// Install the next trigger once a firing has returned.
    pub fn finish_firing(&mut self, now: DateTime<Utc>) {
        if self.state != JobState::Scheduled {
            return;
        }
        self.next_run = self.mode.as_ref().and_then(|mode| mode.next_after(now));
        if self.next_run.is_none() {
            // Nothing left to trigger (e.g. a capless schedule that overflowed).
            self.state = JobState::Completed;
        }
    }

    /// Remove the trigger without changing counters. A job that has not
    /// finished becomes `Cancelled`.
    pub fn cancel(&mut self) {
        self.next_run = None;
        if matches!(self.state, JobState::Registered | JobState::Scheduled) {
            self.state = JobState::Cancelled;
        }
    }

    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    #[must_use]
    pub fn scenario_id(&self) -> &str {
        &self.scenario.id
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub const fn run_count(&self) -> u32 {
        self.run_count
    }

    #[must_use]
    pub const fn max_runs(&self) -> Option<u32> {
        self.max_runs
    }

    #[must_use]
    pub const fn next_run(&self) -> Option<DateTime<Utc>> {
        self.next_run
    }

    #[must_use]
    pub const fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Bounded jobs can finish on their own.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.max_runs.is_some()
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        let status = match self.state {
            JobState::Completed => "completed",
            JobState::FailedToSchedule => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Registered | JobState::Scheduled => "active",
        };
        JobStatus {
            scenario_id: self.scenario.id.clone(),
            mode: self
                .mode
                .as_ref()
                .map_or_else(|| self.configured_mode(), |m| m.name().to_string()),
            run_count: self.run_count,
            max_runs: self.max_runs,
            last_run: self.last_run,
            next_run: self.next_run,
            status: status.to_string(),
            error: self.error.clone(),
        }
    }

    fn configured_mode(&self) -> String {
        self.scenario
            .schedule
            .mode
            .clone()
            .unwrap_or_else(|| "once".to_string())
    }
}

/// Status projection of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub scenario_id: String,
    pub mode: String,
    pub run_count: u32,
    pub max_runs: Option<u32>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// active | completed | failed | cancelled
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    /// `n/max`, or `n/∞` when unbounded.
    #[must_use]
    pub fn runs(&self) -> String {
        self.max_runs.map_or_else(
            || format!("{}/∞", self.run_count),
            |max| format!("{}/{max}", self.run_count),
        )
    }

    #[must_use]
    pub fn next_run_display(&self) -> String {
        self.next_run.map_or_else(|| "-".to_string(), format_local)
    }
}

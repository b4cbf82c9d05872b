//! Scenario scheduler.
//!
//! One [`Scheduler`] owns every job and its trigger. The run loop services
//! due triggers, then sleeps one poll quantum, until every bounded job has
//! completed or a [`StopHandle`] is raised.

pub mod job;
pub mod mode;

pub use job::{Firing, JobState, JobStatus, ScheduleJob};
pub use mode::{ExecutionMode, ScheduleConfig, ScheduleMode, TimeUnit};

use crate::config::{Scenario, Settings};
use crate::runner::{FiringReport, ProtocolRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Source of the current time and of sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared flag that stops the run loop before its next poll.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for signal registration.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub execution: ExecutionMode,
    pub poll_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::Sequential,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&Settings> for SchedulerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            execution: settings.execution,
            poll_interval: settings.poll_interval,
        }
    }
}

/// Snapshot of the scheduler and all its jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub total_jobs: usize,
    pub active_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    pub jobs: Vec<JobStatus>,
}

impl SchedulerStatus {
    /// Text table of the jobs.
    #[must_use]
    pub fn render_table(&self) -> String {
        let rule = "=".repeat(80);
        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str("TEST SCHEDULER STATUS\n");
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "Running: {} | Jobs: {} | Active: {} | Completed: {}",
            self.running, self.total_jobs, self.active_jobs, self.completed_jobs
        ));
        if self.failed_jobs > 0 {
            out.push_str(&format!(" | Failed: {}", self.failed_jobs));
        }
        if self.cancelled_jobs > 0 {
            out.push_str(&format!(" | Cancelled: {}", self.cancelled_jobs));
        }
        out.push_str("\n\n");
        out.push_str(&format!(
            "{:<35} {:<12} {:<15} {:<10}\n",
            "Scenario ID", "Mode", "Runs", "Status"
        ));
        out.push_str(&"-".repeat(80));
        out.push('\n');
        for job in &self.jobs {
            out.push_str(&format!(
                "{:<35} {:<12} {:<15} {:<10}\n",
                job.scenario_id,
                job.mode,
                job.runs(),
                job.status
            ));
        }
        out.push_str(&rule);
        out.push('\n');
        out
    }
}

/// Owns the jobs, their triggers and the protocol executors.
pub struct Scheduler<C: Clock = SystemClock> {
    jobs: Vec<ScheduleJob>,
    registry: ProtocolRegistry,
    options: SchedulerOptions,
    clock: C,
    stop: StopHandle,
    running: bool,
}

impl Scheduler<SystemClock> {
    #[must_use]
    pub fn new(registry: ProtocolRegistry, options: SchedulerOptions) -> Self {
        Self::with_clock(registry, options, SystemClock)
    }
}

impl<C: Clock> Scheduler<C> {
    #[must_use]
    pub fn with_clock(registry: ProtocolRegistry, options: SchedulerOptions, clock: C) -> Self {
        Self {
            jobs: Vec::new(),
            registry,
            options,
            clock,
            stop: StopHandle::new(),
            running: false,
        }
    }

    /// Share an externally owned stop flag (e.g. one wired to signals).
    #[must_use]
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Register a job per enabled scenario. Disabled and cron scenarios are
    /// skipped. Returns the number registered.
    pub fn load(&mut self, scenarios: &[Scenario]) -> usize {
        let mut registered = 0;
        for scenario in scenarios {
            if !scenario.enabled {
                debug!(scenario_id = %scenario.id, "Skipping disabled scenario");
                continue;
            }
            if is_cron(scenario) {
                warn!(
                    scenario_id = %scenario.id,
                    "Cron schedules are handled by an external scheduler; skipping"
                );
                continue;
            }
            self.jobs
                .push(ScheduleJob::register(Arc::new(scenario.clone())));
            registered += 1;
        }
        registered
    }

    /// Install triggers for every registered job. Returns how many were
    /// scheduled; failures are logged and the rest carry on.
    pub fn start(&mut self) -> usize {
        let now = self.clock.now();
        let mut scheduled = 0;
        for job in &mut self.jobs {
            if job.schedule(now) {
                scheduled += 1;
            }
        }
        self.running = scheduled > 0;
        info!(
            scheduled,
            total = self.jobs.len(),
            execution = %self.options.execution,
            "Scheduler started"
        );
        scheduled
    }

    /// Fire every job due at `now`, earliest trigger first. Returns the
    /// number of firings.
    pub fn run_pending_at(&mut self, now: DateTime<Utc>) -> usize {
        let mut due: Vec<usize> = (0..self.jobs.len())
            .filter(|&i| self.jobs[i].is_due(now))
            .collect();
        due.sort_by_key(|&i| (self.jobs[i].next_run(), i));
        if due.is_empty() {
            return 0;
        }

        match self.options.execution {
            ExecutionMode::Sequential => {
                let mut fired = 0;
                for index in due {
                    if self.stop.is_stopped() {
                        break;
                    }
                    let firing = self.jobs[index].begin_firing(now);
                    log_outcome(&firing, self.registry.dispatch(&firing));
                    self.jobs[index].finish_firing(now);
                    fired += 1;
                }
                fired
            }
            ExecutionMode::Concurrent => {
                let firings: Vec<(usize, Firing)> = due
                    .into_iter()
                    .map(|index| (index, self.jobs[index].begin_firing(now)))
                    .collect();
                let registry = &self.registry;
                std::thread::scope(|scope| {
                    for (_, firing) in &firings {
                        scope.spawn(move || log_outcome(firing, registry.dispatch(firing)));
                    }
                });
                for (index, _) in &firings {
                    self.jobs[*index].finish_firing(now);
                }
                firings.len()
            }
        }
    }

    /// Fire every job due now.
    pub fn run_pending(&mut self) -> usize {
        let now = self.clock.now();
        self.run_pending_at(now)
    }

    /// No scheduled bounded job is left and no unbounded job keeps the loop
    /// alive.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.jobs
            .iter()
            .filter(|job| matches!(job.state(), JobState::Scheduled | JobState::Completed))
            .all(ScheduleJob::is_completed)
    }

    /// Start, then loop until every bounded job completes or stop is
    /// raised. Triggers are released on exit.
    pub fn run(&mut self) -> SchedulerStatus {
        if self.start() == 0 {
            warn!("No scenarios scheduled");
            self.stop();
            return self.status();
        }

        loop {
            if self.stop.is_stopped() {
                info!("Stop requested");
                break;
            }
            self.run_pending();
            if self.is_finished() {
                info!("All bounded jobs completed");
                break;
            }
            self.clock.sleep(self.options.poll_interval);
        }

        self.stop();
        self.status()
    }

    /// Release every trigger and mark the scheduler stopped.
    pub fn stop(&mut self) {
        for job in &mut self.jobs {
            job.cancel();
        }
        self.running = false;
        info!("Scheduler stopped");
    }

    #[must_use]
    pub fn jobs(&self) -> &[ScheduleJob] {
        &self.jobs
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        let jobs: Vec<JobStatus> = self.jobs.iter().map(ScheduleJob::status).collect();
        let count = |status: &str| jobs.iter().filter(|j| j.status == status).count();
        SchedulerStatus {
            running: self.running,
            total_jobs: jobs.len(),
            active_jobs: count("active"),
            completed_jobs: count("completed"),
            failed_jobs: count("failed"),
            cancelled_jobs: count("cancelled"),
            jobs,
        }
    }
}

fn is_cron(scenario: &Scenario) -> bool {
    scenario
        .schedule
        .mode
        .as_deref()
        .is_some_and(|m| m.trim().eq_ignore_ascii_case("cron"))
}

fn log_outcome(firing: &Firing, outcome: crate::error::Result<FiringReport>) {
    match outcome {
        Ok(report) => info!(
            scenario_id = %firing.scenario_id(),
            run = %firing.progress(),
            evaluations = report.evaluations,
            passed = report.passed,
            failed = report.failed,
            errors = report.errors,
            "Firing complete"
        ),
        Err(err) => error!(
            scenario_id = %firing.scenario_id(),
            run = %firing.progress(),
            error = %err,
            "Firing failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{FiringReport, TestExecutor};
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        fired: Mutex<Vec<(String, u32)>>,
    }

    impl TestExecutor for Recorder {
        fn execute(&self, firing: &Firing) -> crate::error::Result<FiringReport> {
            self.fired
                .lock()
                .expect("lock")
                .push((firing.scenario_id().to_string(), firing.run_number));
            Ok(FiringReport::new(firing))
        }
    }

    fn scheduler(recorder: &Arc<Recorder>) -> Scheduler {
        let mut registry = ProtocolRegistry::new();
        registry.register("speed_test", Arc::clone(recorder) as Arc<dyn TestExecutor>);
        Scheduler::new(registry, SchedulerOptions::default())
    }

    fn recurring(id: &str, times: u32) -> Scenario {
        Scenario::new(id, "speed_test").with_schedule(ScheduleConfig {
            mode: Some("recurring".to_string()),
            recurring_interval: Some(Value::from(1)),
            recurring_times: Some(Value::from(times)),
            ..ScheduleConfig::default()
        })
    }

    #[test]
    fn disabled_and_cron_scenarios_are_not_registered() {
        let recorder = Arc::new(Recorder::default());
        let mut sched = scheduler(&recorder);
        let mut disabled = recurring("off", 1);
        disabled.enabled = false;
        let mut cron = recurring("cron", 1);
        cron.schedule.mode = Some("cron".to_string());
        assert_eq!(sched.load(&[disabled, cron, recurring("on", 1)]), 1);
        assert_eq!(sched.status().total_jobs, 1);
    }

    #[test]
    fn failed_job_does_not_block_others() {
        let recorder = Arc::new(Recorder::default());
        let mut sched = scheduler(&recorder);
        let mut custom = recurring("custom", 1);
        custom.schedule.mode = Some("custom".to_string());
        sched.load(&[custom, Scenario::new("once", "speed_test")]);
        assert_eq!(sched.start(), 1);
        assert!(sched.is_running());

        let fired = sched.run_pending();
        assert_eq!(fired, 1);
        let status = sched.status();
        assert_eq!(status.failed_jobs, 1);
        assert_eq!(status.completed_jobs, 1);
        assert!(sched.is_finished());
    }

    #[test]
    fn stop_cancels_unfinished_jobs() {
        let recorder = Arc::new(Recorder::default());
        let mut sched = scheduler(&recorder);
        let endless = Scenario::new("endless", "speed_test").with_schedule(ScheduleConfig {
            mode: Some("every".to_string()),
            interval: Some(Value::from(5)),
            ..ScheduleConfig::default()
        });
        sched.load(&[endless, Scenario::new("once", "speed_test")]);
        sched.start();
        assert_eq!(sched.run_pending(), 1);

        sched.stop();
        let status = sched.status();
        assert!(!status.running);
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.completed_jobs, 1);
        assert_eq!(status.cancelled_jobs, 1);
        assert_eq!(sched.jobs()[0].state(), JobState::Cancelled);
        assert_eq!(status.jobs[0].status, "cancelled");
        assert!(status.render_table().contains("Cancelled: 1"));
    }

    #[test]
    fn unknown_protocol_is_logged_not_fatal() {
        let recorder = Arc::new(Recorder::default());
        let mut sched = scheduler(&recorder);
        sched.load(&[Scenario::new("ftp", "ftp_test")]);
        sched.start();
        assert_eq!(sched.run_pending(), 1);
        assert_eq!(sched.status().jobs[0].run_count, 1);
        assert!(recorder.fired.lock().expect("lock").is_empty());
    }

    #[test]
    fn due_jobs_fire_in_trigger_order() {
        let recorder = Arc::new(Recorder::default());
        let mut sched = scheduler(&recorder);
        sched.load(&[recurring("late", 1), Scenario::new("early", "speed_test")]);
        sched.start();
        let later = Utc::now() + chrono::TimeDelta::minutes(2);
        assert_eq!(sched.run_pending_at(later), 2);
        let fired = recorder.fired.lock().expect("lock").clone();
        assert_eq!(
            fired,
            vec![("early".to_string(), 1), ("late".to_string(), 1)]
        );
    }

    #[test]
    fn stop_releases_triggers() {
        let recorder = Arc::new(Recorder::default());
        let mut sched = scheduler(&recorder);
        sched.load(&[recurring("r", 5)]);
        sched.start();
        sched.stop();
        assert!(!sched.is_running());
        assert!(sched.jobs()[0].next_run().is_none());
        let far = Utc::now() + chrono::TimeDelta::days(1);
        assert_eq!(sched.run_pending_at(far), 0);
    }

    #[test]
    fn status_table_layout() {
        let recorder = Arc::new(Recorder::default());
        let mut sched = scheduler(&recorder);
        sched.load(&[recurring("download_check", 3)]);
        sched.start();
        let table = sched.status().render_table();
        assert!(table.starts_with(&"=".repeat(80)));
        assert!(table.contains("TEST SCHEDULER STATUS"));
        assert!(table.contains("download_check"));
        assert!(table.contains("0/3"));
        assert!(table.contains("active"));
    }
}

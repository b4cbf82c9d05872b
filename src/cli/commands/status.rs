//! Status command: schedule without running and show every job.

use crate::config::{ScenarioDocument, Settings};
use crate::error::Result;
use crate::runner::ProtocolRegistry;
use crate::scheduler::{Scheduler, SchedulerOptions, SchedulerStatus};

/// Status snapshot of the document's enabled scenarios, freshly scheduled.
#[must_use]
pub fn snapshot(document: &ScenarioDocument, settings: &Settings) -> SchedulerStatus {
    let mut scheduler = Scheduler::new(ProtocolRegistry::new(), SchedulerOptions::from(settings));
    scheduler.load(&document.scenarios);
    scheduler.start();
    scheduler.status()
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(document: &ScenarioDocument, settings: &Settings, json: bool) -> Result<()> {
    let status = snapshot(document, settings);
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    print!("{}", status.render_table());
    for job in &status.jobs {
        match &job.error {
            Some(error) => println!("{}: {error}", job.scenario_id),
            None => println!("{}: next run {}", job.scenario_id, job.next_run_display()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;
    use crate::scheduler::ScheduleConfig;

    #[test]
    fn snapshot_reports_failed_and_active_jobs() {
        let mut broken = Scenario::new("broken", "speed_test");
        broken.schedule = ScheduleConfig {
            mode: Some("every".to_string()),
            unit: Some("fortnights".to_string()),
            ..ScheduleConfig::default()
        };
        let mut disabled = Scenario::new("disabled", "speed_test");
        disabled.enabled = false;
        let doc = ScenarioDocument {
            scenarios: vec![Scenario::new("once", "speed_test"), broken, disabled],
            ..ScenarioDocument::default()
        };

        let status = snapshot(&doc, &Settings::default());
        assert_eq!(status.total_jobs, 2);
        assert_eq!(status.active_jobs, 1);
        assert_eq!(status.failed_jobs, 1);
        assert!(status.jobs[0].next_run.is_some());
    }
}

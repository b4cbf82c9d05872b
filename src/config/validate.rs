//! Whole-document validation for `sg check`.

use super::{KNOWN_PROTOCOLS, ScenarioDocument};
use crate::error::{Result, SpeedgateError, ValidationError};
use crate::metrics::ResolvedExpectation;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;

/// What a successful check looked at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub scenarios: usize,
    pub enabled: usize,
    pub expectations: usize,
    /// Non-fatal observations, e.g. cron scenarios this scheduler skips.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Check every scenario and expectation without running anything.
///
/// # Errors
///
/// Returns `ValidationErrors` (or a single `Validation`) listing every
/// problem found.
pub fn validate_document(document: &ScenarioDocument) -> Result<CheckReport> {
    let mut errors = Vec::new();
    let mut report = CheckReport {
        scenarios: document.scenarios.len(),
        ..CheckReport::default()
    };

    if document.global_settings.poll_interval_ms == Some(0) {
        errors.push(ValidationError::new(
            "global_settings.poll_interval_ms",
            "must be at least 1",
        ));
    }

    let now = Utc::now();
    let mut seen = HashSet::new();
    for (index, scenario) in document.scenarios.iter().enumerate() {
        let label = if scenario.id.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("scenarios[{index}].id"),
                "must not be empty",
            ));
            format!("scenarios[{index}]")
        } else {
            if !seen.insert(scenario.id.as_str()) {
                errors.push(ValidationError::new(
                    format!("scenarios[{index}].id"),
                    format!("duplicate scenario id '{}'", scenario.id),
                ));
            }
            format!("scenarios[{}]", scenario.id)
        };

        if scenario.enabled {
            report.enabled += 1;
        }
        if !KNOWN_PROTOCOLS.contains(&scenario.protocol.as_str()) {
            errors.push(ValidationError::new(
                format!("{label}.protocol"),
                format!(
                    "unknown protocol '{}' (known: {})",
                    scenario.protocol,
                    KNOWN_PROTOCOLS.join(", ")
                ),
            ));
        }

        match scenario.schedule_mode() {
            Ok(mode) if mode.name() == "cron" => report.warnings.push(format!(
                "{label}: cron schedules are run by an external scheduler and skipped here"
            )),
            Ok(_) => {}
            Err(err) => errors.push(ValidationError::new(
                format!("{label}.schedule"),
                schedule_reason(err),
            )),
        }
        if let Err(err) = scenario.start_time(now) {
            errors.push(ValidationError::new(
                format!("{label}.schedule.start_time"),
                schedule_reason(err),
            ));
        }

        for (i, expectation) in scenario.expectations.iter().enumerate() {
            report.expectations += 1;
            match ResolvedExpectation::resolve(expectation) {
                Ok(resolved) => {
                    if !(resolved.window_minutes.is_finite() && resolved.window_minutes > 0.0) {
                        errors.push(ValidationError::new(
                            format!("{label}.expectations[{i}].window_minutes"),
                            "must be a positive number",
                        ));
                    }
                    let shape_fits = if resolved.operator.is_range() {
                        resolved.expected.as_range().is_some()
                    } else {
                        resolved.expected.as_scalar().is_some()
                    };
                    if !shape_fits {
                        errors.push(ValidationError::new(
                            format!("{label}.expectations[{i}].value"),
                            format!(
                                "operator '{}' cannot compare against {}",
                                resolved.operator_name, resolved.expected
                            ),
                        ));
                    }
                }
                Err(err) => errors.push(ValidationError::new(
                    format!("{label}.expectations[{i}]"),
                    err.to_string(),
                )),
            }
        }
    }

    if errors.is_empty() {
        Ok(report)
    } else {
        Err(SpeedgateError::from_validation_errors(errors))
    }
}

fn schedule_reason(err: SpeedgateError) -> String {
    match err {
        SpeedgateError::ScheduleConfig { reason, .. } => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;
    use crate::model::Expectation;
    use crate::scheduler::ScheduleConfig;

    fn scenario(id: &str) -> Scenario {
        Scenario::new(id, "speed_test")
            .with_expectation(Expectation::new("download_speed", "gte", 80.0))
    }

    #[test]
    fn valid_document_reports_counts() {
        let mut disabled = scenario("b");
        disabled.enabled = false;
        let doc = ScenarioDocument {
            scenarios: vec![scenario("a"), disabled],
            ..ScenarioDocument::default()
        };
        let report = validate_document(&doc).expect("valid");
        assert_eq!(report.scenarios, 2);
        assert_eq!(report.enabled, 1);
        assert_eq!(report.expectations, 2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn collects_every_problem() {
        let mut bad_schedule = scenario("bad_schedule");
        bad_schedule.schedule = ScheduleConfig {
            mode: Some("every".to_string()),
            unit: Some("fortnights".to_string()),
            ..ScheduleConfig::default()
        };
        let bad_expectation = Scenario::new("bad_expectation", "speed_test")
            .with_expectation(Expectation::new("jitter", "approx", 5.0));
        let doc = ScenarioDocument {
            scenarios: vec![
                bad_schedule,
                bad_expectation,
                scenario("a"),
                scenario("a"),
                Scenario::new("ftp", "ftp_test"),
            ],
            ..ScenarioDocument::default()
        };

        let err = validate_document(&doc).unwrap_err();
        let SpeedgateError::ValidationErrors { errors } = err else {
            panic!("expected ValidationErrors, got {err:?}");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "scenarios[bad_schedule].schedule",
                "scenarios[bad_expectation].expectations[0]",
                "scenarios[3].id",
                "scenarios[ftp].protocol",
            ]
        );
        assert!(errors[1].message.contains("approx"));
    }

    #[test]
    fn reports_wrongly_typed_expectation_fields() {
        let doc: ScenarioDocument = serde_json::from_str(
            r#"{"scenarios": [{
                "id": "typed",
                "protocol": "speed_test",
                "expectations": [
                    {"metric": "jitter", "operator": "lt", "value": [1, 2, 3]},
                    {"metric": "jitter", "operator": "between", "value": 5},
                    {"metric": "jitter", "operator": "eq", "value": 5, "tolerance": "loose"},
                    {"metric": "jitter", "operator": "lt", "value": "7.5"}
                ]
            }]}"#,
        )
        .expect("document parses");

        let err = validate_document(&doc).unwrap_err();
        let SpeedgateError::ValidationErrors { errors } = err else {
            panic!("expected ValidationErrors, got {err:?}");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "scenarios[typed].expectations[0].value",
                "scenarios[typed].expectations[1].value",
                "scenarios[typed].expectations[2]",
            ]
        );
        assert!(errors[2].message.contains("tolerance"));
    }

    #[test]
    fn cron_is_a_warning() {
        let mut cron = scenario("nightly");
        cron.schedule.mode = Some("cron".to_string());
        let doc = ScenarioDocument {
            scenarios: vec![cron],
            ..ScenarioDocument::default()
        };
        let report = validate_document(&doc).expect("valid");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn custom_mode_is_rejected() {
        let mut custom = scenario("custom");
        custom.schedule.mode = Some("custom".to_string());
        let doc = ScenarioDocument {
            scenarios: vec![custom],
            ..ScenarioDocument::default()
        };
        let err = validate_document(&doc).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }
}

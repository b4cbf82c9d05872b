//! Evaluate command: judge a scenario's expectations against a file of
//! measurements, without scheduling.

use crate::cli::{EvaluateArgs, EvaluateOutput};
use crate::config::ScenarioDocument;
use crate::error::{Result, SpeedgateError};
use crate::metrics::{EvalContext, ExpectationEvaluator};
use crate::model::{EvaluationResult, MeasurementRecord, Verdict};
use crate::runner::ReplaySource;
use tracing::warn;

/// Ingest `records` and evaluate every expectation of `scenario_id`.
///
/// The latest iteration found in the records is the current iteration.
///
/// # Errors
///
/// Returns an unknown-name error if the scenario is not in the document.
pub fn evaluate_scenario(
    document: &ScenarioDocument,
    scenario_id: &str,
    records: &[MeasurementRecord],
) -> Result<(ExpectationEvaluator, Vec<EvaluationResult>)> {
    let scenario = document.scenario(scenario_id).ok_or_else(|| {
        let known: Vec<&str> = document.scenarios.iter().map(|s| s.id.as_str()).collect();
        SpeedgateError::unknown_name("scenario", scenario_id, &known)
    })?;

    let mut evaluator = ExpectationEvaluator::new();
    for record in records {
        if let Err(err) = evaluator.ingest_record(record) {
            warn!(scenario_id, error = %err, "Skipping measurement");
        }
    }

    let current = records.iter().filter_map(|r| r.iteration).max();
    let ctx = EvalContext::new(current).for_scenario(scenario_id);
    let results = evaluator.evaluate_all(&scenario.expectations, &ctx);
    Ok((evaluator, results))
}

/// Execute the evaluate command.
///
/// # Errors
///
/// Returns an error if the scenario is unknown or the measurements file
/// cannot be read.
pub fn execute(args: &EvaluateArgs, document: &ScenarioDocument, json: bool) -> Result<()> {
    let source = ReplaySource::from_path(&args.measurements)?;
    let records = source.for_scenario(&args.scenario);
    let (evaluator, results) = evaluate_scenario(document, &args.scenario, &records)?;

    match args.output {
        EvaluateOutput::Results => {
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    println!("{}", result_line(result));
                }
            }
        }
        EvaluateOutput::Summary => {
            let summary = evaluator.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Evaluations: {} ({} passed, {} failed, {} errors), success rate {:.1}%",
                    summary.total_evaluations,
                    summary.passed_evaluations,
                    summary.failed_evaluations,
                    summary.error_evaluations,
                    summary.success_rate
                );
                for (metric, stats) in &summary.metrics {
                    println!(
                        "  {metric}: n={} mean={:.2} median={:.2} p95={:.2} min={:.2} max={:.2} sd={:.2}",
                        stats.count,
                        stats.mean,
                        stats.median,
                        stats.p95,
                        stats.min,
                        stats.max,
                        stats.std_dev
                    );
                }
            }
        }
        EvaluateOutput::Export => {
            // Export is a document; it is JSON either way.
            println!("{}", serde_json::to_string_pretty(&evaluator.export())?);
        }
    }
    Ok(())
}

fn result_line(result: &EvaluationResult) -> String {
    if result.verdict == Verdict::Error {
        return format!(
            "ERROR {}: {}",
            result.metric,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    let expected = result
        .expected_value
        .as_ref()
        .map_or_else(String::new, ToString::to_string);
    let actual = result
        .actual_value
        .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    let unit = if result.unit.is_empty() {
        String::new()
    } else {
        format!(" {}", result.unit)
    };
    format!(
        "{} {} {}({}) {} {expected}{unit}: actual {actual}{unit} from {} points",
        result.verdict,
        result.metric,
        result.aggregation,
        result.evaluation_scope,
        result.operator,
        result.data_points_evaluated
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;
    use crate::model::Expectation;

    fn records() -> Vec<MeasurementRecord> {
        (1..=10)
            .map(|i| MeasurementRecord {
                iteration: Some(i),
                test_type: Some("download".to_string()),
                mbps: Some(45.0 + 5.0 * f64::from(i)),
                status: "success".to_string(),
                ..MeasurementRecord::default()
            })
            .collect()
    }

    fn document() -> ScenarioDocument {
        ScenarioDocument {
            scenarios: vec![
                Scenario::new("download_check", "speed_test")
                    .with_expectation(
                        Expectation::new("download_speed", "gte", 80.0).aggregation("p95"),
                    )
                    .with_expectation(
                        Expectation::new("download_speed", "gte", 90.0).scope("per_iteration"),
                    )
                    .with_expectation(Expectation::new("latency", "lt", 20.0)),
            ],
            ..ScenarioDocument::default()
        }
    }

    #[test]
    fn evaluates_all_expectations_with_latest_iteration() {
        let (evaluator, results) =
            evaluate_scenario(&document(), "download_check", &records()).expect("evaluate");
        assert_eq!(results.len(), 3);
        assert!((results[0].actual_value.unwrap() - 92.75).abs() < 1e-9);
        assert!(results[0].passed);
        assert_eq!(results[1].iteration, Some(10));
        assert_eq!(results[1].actual_value, Some(95.0));
        assert_eq!(results[2].verdict, Verdict::Error);
        assert_eq!(evaluator.summary().error_evaluations, 1);
    }

    #[test]
    fn unknown_scenario_lists_known_ids() {
        let err = evaluate_scenario(&document(), "upload", &[]).unwrap_err();
        assert!(err.to_string().contains("download_check"));
    }

    #[test]
    fn result_lines_read_naturally() {
        let (_, results) =
            evaluate_scenario(&document(), "download_check", &records()).expect("evaluate");
        assert_eq!(
            result_line(&results[0]),
            "PASS download_speed p95(aggregate) gte 80: actual 92.75 from 10 points"
        );
        assert!(result_line(&results[2]).starts_with("ERROR latency: "));
    }
}

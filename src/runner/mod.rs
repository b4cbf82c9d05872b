//! Test execution: protocol executors, measurement sources and result sinks.
//!
//! The prober and the report store are external; [`MeasurementSource`] and
//! [`ResultSink`] are the seams they plug into.

pub mod sink;
pub mod source;

pub use sink::{JsonLinesSink, MemoryContents, MemorySink, ResultSink};
pub use source::{MeasurementSource, ReplaySource};

use crate::config::{KNOWN_PROTOCOLS, Scenario};
use crate::error::{Result, SpeedgateError};
use crate::metrics::{EvalContext, ExpectationEvaluator, Summary};
use crate::model::{EvaluationResult, Expectation, MeasurementRecord, ScenarioSummary};
use crate::scheduler::Firing;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Runs one firing of a scenario for a protocol.
pub trait TestExecutor: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the test could not be run or its results not
    /// recorded. Expectation failures are reported in the report instead.
    fn execute(&self, firing: &Firing) -> Result<FiringReport>;
}

/// Outcome counts of one firing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FiringReport {
    pub scenario_id: String,
    pub run_number: u32,
    pub records: usize,
    pub evaluations: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub summaries: usize,
}

impl FiringReport {
    #[must_use]
    pub fn new(firing: &Firing) -> Self {
        Self {
            scenario_id: firing.scenario_id().to_string(),
            run_number: firing.run_number,
            ..Self::default()
        }
    }

    fn count(&mut self, results: &[EvaluationResult]) {
        self.evaluations += results.len();
        for result in results {
            if result.is_error() {
                self.errors += 1;
            } else if result.passed {
                self.passed += 1;
            } else {
                self.failed += 1;
            }
        }
    }
}

/// Protocol tag to executor.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    executors: BTreeMap<String, Arc<dyn TestExecutor>>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl ProtocolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one executor for every built-in protocol.
    #[must_use]
    pub fn with_builtin(executor: Arc<dyn TestExecutor>) -> Self {
        let mut registry = Self::new();
        for protocol in KNOWN_PROTOCOLS.iter().copied() {
            registry.register(protocol, Arc::clone(&executor));
        }
        registry
    }

    pub fn register(&mut self, protocol: impl Into<String>, executor: Arc<dyn TestExecutor>) {
        self.executors.insert(protocol.into(), executor);
    }

    #[must_use]
    pub fn get(&self, protocol: &str) -> Option<&Arc<dyn TestExecutor>> {
        self.executors.get(protocol)
    }

    #[must_use]
    pub fn protocols(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }

    /// Run a firing with the executor for its scenario's protocol.
    ///
    /// # Errors
    ///
    /// `UnknownProtocol` if nothing is registered for the tag, otherwise
    /// whatever the executor returns.
    pub fn dispatch(&self, firing: &Firing) -> Result<FiringReport> {
        let protocol = firing.scenario.protocol.as_str();
        let executor = self
            .get(protocol)
            .ok_or_else(|| SpeedgateError::UnknownProtocol {
                protocol: protocol.to_string(),
                registered: self.protocols().join(", "),
            })?;
        info!(
            scenario_id = %firing.scenario_id(),
            protocol,
            run = %firing.progress(),
            "Running scenario"
        );
        executor.execute(firing)
    }
}

/// Collects, ingests, evaluates and reports each firing.
///
/// Each scenario gets its own evaluator. Per-iteration expectations are
/// evaluated on every firing with the run number as iteration;
/// scenario-scoped ones once, after the final firing of a bounded job.
pub struct ScenarioRunner {
    source: Box<dyn MeasurementSource>,
    sink: Mutex<Box<dyn ResultSink>>,
    evaluators: Mutex<HashMap<String, ExpectationEvaluator>>,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(source: Box<dyn MeasurementSource>, sink: Box<dyn ResultSink>) -> Self {
        Self {
            source,
            sink: Mutex::new(sink),
            evaluators: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluation summary per scenario, keyed by id.
    #[must_use]
    pub fn summaries(&self) -> BTreeMap<String, Summary> {
        self.evaluators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, evaluator)| (id.clone(), evaluator.summary()))
            .collect()
    }

    /// Evaluation history of one scenario.
    #[must_use]
    pub fn history(&self, scenario_id: &str) -> Vec<EvaluationResult> {
        self.evaluators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scenario_id)
            .map(|e| e.history().to_vec())
            .unwrap_or_default()
    }

    fn prepare(firing: &Firing, mut records: Vec<MeasurementRecord>) -> Vec<MeasurementRecord> {
        for record in &mut records {
            record
                .scenario_id
                .get_or_insert_with(|| firing.scenario_id().to_string());
            record.iteration.get_or_insert(firing.run_number);
            record.timestamp.get_or_insert(firing.fired_at);
        }
        records
    }

    fn evaluate(
        &self,
        firing: &Firing,
        records: &[MeasurementRecord],
    ) -> (Vec<EvaluationResult>, Vec<ScenarioSummary>) {
        let scenario: &Scenario = &firing.scenario;
        let mut evaluators = self
            .evaluators
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let evaluator = evaluators.entry(scenario.id.clone()).or_default();

        for record in records {
            if let Err(err) = evaluator.ingest_record(record) {
                warn!(scenario_id = %scenario.id, error = %err, "Skipping measurement");
            }
        }

        let iteration_expectations: Vec<Expectation> =
            scenario.iteration_expectations().cloned().collect();
        let ctx = EvalContext::at(Some(firing.run_number), firing.fired_at)
            .for_scenario(scenario.id.clone());
        let results = evaluator.evaluate_all(&iteration_expectations, &ctx);

        let mut summaries = Vec::new();
        if firing.is_final() {
            let scenario_expectations: Vec<Expectation> =
                scenario.scenario_expectations().cloned().collect();
            if !scenario_expectations.is_empty() {
                let ctx = EvalContext::at(None, firing.fired_at).for_scenario(scenario.id.clone());
                let final_results = evaluator.evaluate_all(&scenario_expectations, &ctx);
                summaries = final_results
                    .iter()
                    .map(|r| ScenarioSummary::from_result(&scenario.id, r))
                    .collect();
                let mut all = results;
                all.extend(final_results);
                return (all, summaries);
            }
        }
        (results, summaries)
    }
}

impl TestExecutor for ScenarioRunner {
    fn execute(&self, firing: &Firing) -> Result<FiringReport> {
        let records = self
            .source
            .collect(firing)
            .map_err(|e| SpeedgateError::Execution {
                scenario_id: firing.scenario_id().to_string(),
                reason: e.to_string(),
            })?;
        let records = Self::prepare(firing, records);
        debug!(
            scenario_id = %firing.scenario_id(),
            records = records.len(),
            "Collected measurements"
        );

        let (results, summaries) = self.evaluate(firing, &records);

        let mut report = FiringReport::new(firing);
        report.records = records.len();
        report.count(&results);
        report.summaries = summaries.len();

        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        for record in &records {
            sink.record_measurement(record)?;
        }
        for result in &results {
            sink.record_evaluation(result)?;
        }
        for summary in &summaries {
            sink.record_summary(summary)?;
        }
        sink.flush()?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Verdict;
    use crate::scheduler::ScheduleConfig;
    use chrono::Utc;
    use serde_json::Value;

    fn record(iteration: u32, mbps: f64) -> MeasurementRecord {
        MeasurementRecord {
            scenario_id: Some("download_check".to_string()),
            iteration: Some(iteration),
            test_type: Some("download".to_string()),
            mbps: Some(mbps),
            status: "success".to_string(),
            ..MeasurementRecord::default()
        }
    }

    fn scenario() -> Arc<Scenario> {
        let mut final_check = Expectation::new("download_speed", "gte", 85.0);
        final_check.evaluation_scope = Some("scenario".to_string());
        Arc::new(
            Scenario::new("download_check", "speed_test")
                .with_schedule(ScheduleConfig {
                    mode: Some("recurring".to_string()),
                    recurring_times: Some(Value::from(2)),
                    ..ScheduleConfig::default()
                })
                .with_expectation(
                    Expectation::new("download_speed", "gte", 90.0).scope("per_iteration"),
                )
                .with_expectation(final_check),
        )
    }

    fn firing(scenario: &Arc<Scenario>, run_number: u32) -> Firing {
        Firing {
            scenario: Arc::clone(scenario),
            run_number,
            max_runs: Some(2),
            fired_at: Utc::now(),
        }
    }

    fn runner(sink: &MemorySink) -> ScenarioRunner {
        let source = ReplaySource::from_records(vec![record(1, 95.0), record(2, 80.0)]);
        ScenarioRunner::new(Box::new(source), Box::new(sink.clone()))
    }

    #[test]
    fn evaluates_each_iteration_and_summarizes_after_final_firing() {
        let sink = MemorySink::new();
        let runner = runner(&sink);
        let scenario = scenario();

        let first = runner.execute(&firing(&scenario, 1)).expect("first");
        assert_eq!((first.records, first.passed, first.summaries), (1, 1, 0));

        let second = runner.execute(&firing(&scenario, 2)).expect("second");
        assert_eq!(second.failed, 1, "80 < 90 on iteration 2");
        assert_eq!(second.summaries, 1);

        let contents = sink.contents();
        assert_eq!(contents.measurements.len(), 2);
        assert_eq!(contents.evaluations.len(), 3);
        let summary = &contents.summaries[0];
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.actual_value, Some(87.5));
        assert_eq!(summary.verdict, Verdict::Pass);
        assert_eq!(runner.history("download_check").len(), 3);
    }

    #[test]
    fn missing_measurements_become_error_verdicts() {
        let sink = MemorySink::new();
        let runner = ScenarioRunner::new(
            Box::new(ReplaySource::default()),
            Box::new(sink.clone()),
        );
        let report = runner.execute(&firing(&scenario(), 1)).expect("execute");
        assert_eq!(report.errors, 1);
        assert_eq!(sink.contents().evaluations[0].verdict, Verdict::Error);
    }

    #[test]
    fn registry_rejects_unknown_protocol() {
        let sink = MemorySink::new();
        let registry = ProtocolRegistry::with_builtin(Arc::new(runner(&sink)));
        assert_eq!(registry.protocols(), vec!["speed_test", "voip_test"]);

        let ftp = Arc::new(Scenario::new("ftp", "ftp_test"));
        let err = registry.dispatch(&firing(&ftp, 1)).unwrap_err();
        assert!(matches!(err, SpeedgateError::UnknownProtocol { .. }));
        assert!(err.to_string().contains("speed_test, voip_test"));
    }
}

//! ExpectationEvaluator: scope, aggregate and compare declared expectations.
//!
//! Owns the metric series map and the evaluation history. Both are
//! append-only; `clear` is the only way to drop data.

use crate::error::{Result, SpeedgateError};
use crate::metrics::aggregation::{self, Aggregation, Estimator};
use crate::metrics::ingest::{self, RawPoint};
use crate::metrics::operator::{self, CompareOptions, Inclusive, Operator};
use crate::metrics::scope::{self, DEFAULT_PASS_KEY, DEFAULT_WINDOW_MINUTES, Scope, ScopeParams};
use crate::model::{
    DataPoint, EvaluationResult, Expectation, ExpectedValue, MeasurementRecord, ValuePreview,
    Verdict,
};
use crate::util::lenient;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Checked form of an [`Expectation`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExpectation {
    pub metric: String,
    pub aggregation: Aggregation,
    /// Name as configured, echoed into results.
    pub aggregation_name: String,
    pub operator: Operator,
    pub operator_name: String,
    pub expected: ExpectedValue,
    pub scope: Scope,
    pub window_minutes: f64,
    pub options: CompareOptions,
    pub unit: String,
}

impl ResolvedExpectation {
    /// Validate field presence and names, and coerce the expected value.
    ///
    /// Tolerance is only read for `eq`/`neq` and inclusivity only for
    /// `between`; both are ignored elsewhere.
    ///
    /// # Errors
    ///
    /// `MissingField` for a missing metric, operator or value, `UnknownName`
    /// for unrecognized method, operator, scope or inclusivity, and
    /// `Validation` for a non-numeric tolerance or window.
    pub fn resolve(raw: &Expectation) -> Result<Self> {
        let metric = raw
            .metric
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| missing("metric"))?;
        let operator_name = raw
            .operator
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .ok_or_else(|| missing("operator"))?;
        let expected = raw.value.clone().ok_or_else(|| missing("value"))?.coerce();

        let aggregation_name = raw.aggregation.as_deref().unwrap_or("mean");
        let aggregation: Aggregation = aggregation_name.parse()?;
        let operator: Operator = operator_name.parse()?;
        let scope: Scope = raw
            .evaluation_scope
            .as_deref()
            .map_or(Ok(Scope::default()), str::parse)?;

        let window_minutes = lenient::number("window_minutes", raw.window_minutes.as_ref())?
            .unwrap_or(DEFAULT_WINDOW_MINUTES);

        let mut options = CompareOptions::default();
        if operator.uses_tolerance() {
            options.tolerance =
                lenient::number("tolerance", raw.tolerance.as_ref())?.unwrap_or(0.0);
        }
        if operator.is_range() {
            options.inclusive = raw
                .inclusive
                .as_deref()
                .map_or(Ok(Inclusive::default()), str::parse)?;
        }

        Ok(Self {
            metric: metric.to_string(),
            aggregation,
            aggregation_name: aggregation_name.to_string(),
            operator,
            operator_name: operator_name.to_string(),
            expected,
            scope,
            window_minutes,
            options,
            unit: raw.unit.clone().unwrap_or_default(),
        })
    }
}

fn missing(field: &str) -> SpeedgateError {
    SpeedgateError::MissingField {
        field: field.to_string(),
    }
}

/// Per-call inputs to an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalContext {
    /// Current iteration, used by `per_iteration`.
    pub iteration: Option<u32>,
    /// Evaluation time; also the end of a windowed scope.
    pub now: DateTime<Utc>,
    /// Overrides the expectation's `window_minutes`.
    pub window_override: Option<f64>,
    /// Tag stamped on every result.
    pub scenario_id: Option<String>,
}

impl EvalContext {
    #[must_use]
    pub fn new(iteration: Option<u32>) -> Self {
        Self::at(iteration, Utc::now())
    }

    #[must_use]
    pub const fn at(iteration: Option<u32>, now: DateTime<Utc>) -> Self {
        Self {
            iteration,
            now,
            window_override: None,
            scenario_id: None,
        }
    }

    #[must_use]
    pub fn for_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = Some(scenario_id.into());
        self
    }

    #[must_use]
    pub fn with_window(mut self, minutes: f64) -> Self {
        self.window_override = Some(minutes);
        self
    }
}

/// Descriptive statistics for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub std_dev: f64,
}

impl MetricStats {
    /// With fewer than two values, `p95` is the lone value and `std_dev` is 0.
    ///
    /// # Errors
    ///
    /// Empty or non-finite input.
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let (p95, std_dev) = if values.len() >= 2 {
            (
                aggregation::percentile(values, 95.0)?,
                aggregation::std_dev(values, Estimator::Sample)?,
            )
        } else {
            (aggregation::min(values)?, 0.0)
        };
        Ok(Self {
            count: values.len(),
            min: aggregation::min(values)?,
            max: aggregation::max(values)?,
            mean: aggregation::mean(values)?,
            median: aggregation::median(values)?,
            p95,
            std_dev,
        })
    }
}

/// Read-only projection over current evaluator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_metrics: usize,
    pub metrics: BTreeMap<String, MetricStats>,
    pub total_evaluations: usize,
    pub passed_evaluations: usize,
    /// Everything that did not pass, ERROR included.
    pub failed_evaluations: usize,
    /// Subset of `failed_evaluations` with verdict ERROR.
    pub error_evaluations: usize,
    pub success_rate: f64,
}

/// Everything the evaluator holds, ready for an external sink.
#[derive(Debug, Clone, Serialize)]
pub struct Export<'a> {
    pub metrics: &'a BTreeMap<String, Vec<DataPoint>>,
    pub evaluations: &'a [EvaluationResult],
    pub summary: Summary,
}

/// Metric store plus evaluation history.
#[derive(Debug, Default)]
pub struct ExpectationEvaluator {
    series: BTreeMap<String, Vec<DataPoint>>,
    history: Vec<EvaluationResult>,
}

impl ExpectationEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Ingestion ===

    /// Append one point, creating the series on first use.
    pub fn add_data_point(&mut self, metric: &str, point: DataPoint) {
        debug!(
            metric,
            value = point.value,
            iteration = ?point.iteration,
            "Added data point"
        );
        self.series.entry(metric.to_string()).or_default().push(point);
    }

    /// Append a value stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `value` is not finite.
    pub fn add_value(&mut self, metric: &str, value: f64, iteration: Option<u32>) -> Result<()> {
        let point = DataPoint::now(value)?.with_iteration_opt(iteration);
        self.add_data_point(metric, point);
        Ok(())
    }

    /// Normalize and append several raw points. Nothing is appended if any
    /// point is invalid.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first bad index.
    pub fn add_points(
        &mut self,
        metric: &str,
        raw: &[RawPoint],
        base_iteration: Option<u32>,
    ) -> Result<usize> {
        let points = ingest::normalize_points(raw, base_iteration, Utc::now())?;
        let added = points.len();
        for point in points {
            self.add_data_point(metric, point);
        }
        Ok(added)
    }

    /// Ingest one prober record; returns the number of points appended.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a numeric field is not finite.
    pub fn ingest_record(&mut self, record: &MeasurementRecord) -> Result<usize> {
        let points = ingest::record_points(record, Utc::now())?;
        let added = points.len();
        for (metric, point) in points {
            self.add_data_point(metric, point);
        }
        Ok(added)
    }

    // === Queries ===

    /// Metric names in sorted order.
    #[must_use]
    pub fn metric_names(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn series(&self, metric: &str) -> Option<&[DataPoint]> {
        self.series.get(metric).map(Vec::as_slice)
    }

    /// Scope projection without aggregation.
    ///
    /// # Errors
    ///
    /// `UnknownMetric` when no series exists, otherwise the scope's error.
    pub fn metric_data(
        &self,
        metric: &str,
        scope: Scope,
        params: &ScopeParams,
    ) -> Result<Vec<f64>> {
        let data = self
            .series
            .get(metric)
            .ok_or_else(|| self.unknown_metric(metric))?;
        scope::select(scope, data, params)
    }

    #[must_use]
    pub fn history(&self) -> &[EvaluationResult] {
        &self.history
    }

    /// History filtered by metric and, optionally, to passing results.
    #[must_use]
    pub fn evaluation_history(
        &self,
        metric: Option<&str>,
        passed_only: bool,
    ) -> Vec<&EvaluationResult> {
        self.history
            .iter()
            .filter(|r| metric.is_none_or(|m| r.metric == m))
            .filter(|r| !passed_only || r.passed)
            .collect()
    }

    /// Percentage of earlier PASS results among earlier PASS/FAIL results for
    /// `metric`. ERROR results are ignored.
    ///
    /// # Errors
    ///
    /// Scope error when there is no prior PASS/FAIL result.
    pub fn success_rate(&self, metric: &str) -> Result<(f64, usize)> {
        let records: Vec<_> = self
            .history
            .iter()
            .filter(|r| r.metric == metric && !r.is_error())
            .map(|r| json!({ DEFAULT_PASS_KEY: r.passed }))
            .collect();
        if records.is_empty() {
            return Err(SpeedgateError::scope(format!(
                "no prior evaluations of '{metric}' to compute a success rate from"
            )));
        }
        let rate = scope::cumulative_success_rate(&records, DEFAULT_PASS_KEY)?;
        Ok((rate, records.len()))
    }

    fn unknown_metric(&self, metric: &str) -> SpeedgateError {
        SpeedgateError::UnknownMetric {
            metric: metric.to_string(),
            available: self.series.keys().cloned().collect(),
        }
    }

    // === Evaluation ===

    /// Evaluate one expectation at the current time.
    ///
    /// # Errors
    ///
    /// See [`ExpectationEvaluator::evaluate`].
    pub fn evaluate_expectation(
        &mut self,
        expectation: &Expectation,
        iteration: Option<u32>,
    ) -> Result<EvaluationResult> {
        self.evaluate(expectation, &EvalContext::new(iteration))
    }

    /// Scope, aggregate, compare; append and return the result.
    ///
    /// A failed evaluation appends nothing.
    ///
    /// # Errors
    ///
    /// Configuration errors (missing fields, unknown names or metric),
    /// validation errors from the Aggregator or Comparator, and scope errors.
    pub fn evaluate(
        &mut self,
        expectation: &Expectation,
        ctx: &EvalContext,
    ) -> Result<EvaluationResult> {
        let resolved = ResolvedExpectation::resolve(expectation)?;

        let (actual, sample_count, preview) = if resolved.scope == Scope::CumulativeSuccessRate {
            let (rate, prior) = self.success_rate(&resolved.metric)?;
            (rate, prior, None)
        } else {
            let params = ScopeParams {
                iteration: ctx.iteration,
                window_minutes: Some(ctx.window_override.unwrap_or(resolved.window_minutes)),
                reference_time: Some(ctx.now),
                start_time: None,
                end_time: None,
            };
            let values = self.metric_data(&resolved.metric, resolved.scope, &params)?;
            let actual = resolved.aggregation.apply(&values)?;
            (actual, values.len(), Some(ValuePreview::from_values(&values)))
        };

        let passed = operator::compare(
            actual,
            resolved.operator,
            &resolved.expected,
            resolved.options,
        )?;
        let verdict = Verdict::from_passed(passed);

        let result = EvaluationResult {
            metric: resolved.metric,
            aggregation: resolved.aggregation_name,
            evaluation_scope: resolved.scope.as_str().to_string(),
            operator: resolved.operator_name,
            expected_value: Some(resolved.expected),
            actual_value: Some(actual),
            unit: resolved.unit,
            passed,
            verdict,
            timestamp: ctx.now,
            iteration: ctx.iteration,
            data_points_evaluated: sample_count,
            raw_values: preview,
            error: None,
            scenario_id: ctx.scenario_id.clone(),
        };

        let expected_display = result
            .expected_value
            .as_ref()
            .map_or_else(String::new, ToString::to_string);
        let actual_display = format!("{actual:.2}");
        info!(
            metric = %result.metric,
            aggregation = %result.aggregation,
            operator = %result.operator,
            expected = %expected_display,
            actual = %actual_display,
            verdict = %verdict,
            "Evaluation"
        );

        self.history.push(result.clone());
        Ok(result)
    }

    /// Evaluate each expectation independently at the current time.
    #[must_use = "results should be forwarded to a sink"]
    pub fn evaluate_expectations(
        &mut self,
        expectations: &[Expectation],
        iteration: Option<u32>,
    ) -> Vec<EvaluationResult> {
        self.evaluate_all(expectations, &EvalContext::new(iteration))
    }

    /// Evaluate each expectation independently.
    ///
    /// A failing expectation becomes an ERROR result (also appended to
    /// history); the rest of the batch is unaffected.
    #[must_use = "results should be forwarded to a sink"]
    pub fn evaluate_all(
        &mut self,
        expectations: &[Expectation],
        ctx: &EvalContext,
    ) -> Vec<EvaluationResult> {
        let mut results = Vec::with_capacity(expectations.len());
        for expectation in expectations {
            match self.evaluate(expectation, ctx) {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!(
                        metric = expectation.metric_or_unknown(),
                        error = %err,
                        "Failed to evaluate expectation"
                    );
                    let mut result =
                        EvaluationResult::error(expectation, ctx.iteration, &err, ctx.now);
                    result.scenario_id.clone_from(&ctx.scenario_id);
                    self.history.push(result.clone());
                    results.push(result);
                }
            }
        }
        results
    }

    // === Reporting ===

    /// Recomputed on every call.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let total = self.history.len();
        let passed = self.history.iter().filter(|r| r.passed).count();
        let errors = self.history.iter().filter(|r| r.is_error()).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };

        let metrics = self
            .series
            .iter()
            .filter_map(|(name, points)| {
                let values: Vec<f64> = points.iter().map(|p| p.value).collect();
                MetricStats::from_values(&values)
                    .ok()
                    .map(|stats| (name.clone(), stats))
            })
            .collect();

        Summary {
            total_metrics: self.series.len(),
            metrics,
            total_evaluations: total,
            passed_evaluations: passed,
            failed_evaluations: total - passed,
            error_evaluations: errors,
            success_rate,
        }
    }

    /// Series, history and summary in one document.
    #[must_use]
    pub fn export(&self) -> Export<'_> {
        Export {
            metrics: &self.series,
            evaluations: &self.history,
            summary: self.summary(),
        }
    }

    /// Drop all series and history.
    pub fn clear(&mut self) {
        self.series.clear();
        self.history.clear();
        info!("Cleared all metrics and evaluations");
    }
}

//! Result sinks: where measurements and verdicts go.

use crate::error::Result;
use crate::model::{EvaluationResult, MeasurementRecord, ScenarioSummary};
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives measurement records, evaluation results and scenario summaries.
pub trait ResultSink: Send {
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn record_measurement(&mut self, record: &MeasurementRecord) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the result cannot be written.
    fn record_evaluation(&mut self, result: &EvaluationResult) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the summary cannot be written.
    fn record_summary(&mut self, summary: &ScenarioSummary) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if buffered output cannot be written.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Everything a [`MemorySink`] has received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryContents {
    pub measurements: Vec<MeasurementRecord>,
    pub evaluations: Vec<EvaluationResult>,
    pub summaries: Vec<ScenarioSummary>,
}

/// In-memory sink; clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemoryContents>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far.
    #[must_use]
    pub fn contents(&self) -> MemoryContents {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MemoryContents) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl ResultSink for MemorySink {
    fn record_measurement(&mut self, record: &MeasurementRecord) -> Result<()> {
        self.with(|c| c.measurements.push(record.clone()));
        Ok(())
    }

    fn record_evaluation(&mut self, result: &EvaluationResult) -> Result<()> {
        self.with(|c| c.evaluations.push(result.clone()));
        Ok(())
    }

    fn record_summary(&mut self, summary: &ScenarioSummary) -> Result<()> {
        self.with(|c| c.summaries.push(summary.clone()));
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Measurement(&'a MeasurementRecord),
    Evaluation(&'a EvaluationResult),
    Summary(&'a ScenarioSummary),
}

/// One JSON object per line, tagged with `"type"`.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &Line<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn record_measurement(&mut self, record: &MeasurementRecord) -> Result<()> {
        self.write_line(&Line::Measurement(record))
    }

    fn record_evaluation(&mut self, result: &EvaluationResult) -> Result<()> {
        self.write_line(&Line::Evaluation(result))
    }

    fn record_summary(&mut self, summary: &ScenarioSummary) -> Result<()> {
        self.write_line(&Line::Summary(summary))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Verdict;
    use serde_json::Value;

    fn summary() -> ScenarioSummary {
        ScenarioSummary {
            scenario_id: "download_check".to_string(),
            metric: "download_speed".to_string(),
            aggregation: "mean".to_string(),
            actual_value: Some(88.5),
            sample_count: 3,
            passed: true,
            verdict: Verdict::Pass,
        }
    }

    #[test]
    fn json_lines_are_tagged() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let record = MeasurementRecord {
            scenario_id: Some("download_check".to_string()),
            mbps: Some(91.0),
            status: "success".to_string(),
            ..MeasurementRecord::default()
        };
        sink.record_measurement(&record).expect("write");
        sink.record_summary(&summary()).expect("write");
        sink.flush().expect("flush");

        let output = String::from_utf8(sink.into_inner()).expect("utf8");
        let lines: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).expect("json"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "measurement");
        assert_eq!(lines[0]["mbps"], 91.0);
        assert_eq!(lines[1]["type"], "summary");
        assert_eq!(lines[1]["verdict"], "PASS");
    }

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.record_summary(&summary()).expect("write");
        assert_eq!(sink.contents().summaries.len(), 1);
    }
}

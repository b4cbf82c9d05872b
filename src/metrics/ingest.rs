//! Ingestion boundary: the one place heterogeneous input becomes `DataPoint`s.

use crate::error::{Result, SpeedgateError};
use crate::model::{DataPoint, MeasurementRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DOWNLOAD_SPEED: &str = "download_speed";
pub const UPLOAD_SPEED: &str = "upload_speed";
pub const JITTER: &str = "jitter";
pub const RETRANSMITS: &str = "retransmits";
pub const BYTES: &str = "bytes";
pub const BITS_PER_SECOND: &str = "bits_per_second";
pub const TEST_SUCCESS: &str = "test_success";

/// Metric names produced by [`record_points`].
pub const RECORD_METRICS: &[&str] = &[
    DOWNLOAD_SPEED,
    UPLOAD_SPEED,
    JITTER,
    RETRANSMITS,
    BYTES,
    BITS_PER_SECOND,
    TEST_SUCCESS,
];

/// A point as it may arrive from outside: a bare number or a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPoint {
    Scalar(f64),
    Record(PointRecord),
}

/// Record form of a raw point. Missing timestamps default to ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub iteration: Option<u32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl From<f64> for RawPoint {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

/// Convert raw points into canonical points.
///
/// A scalar at position `i` gets iteration `base + i` (`base` defaults to 0).
/// A record keeps its own iteration, falling back to `base + i` when a base
/// is given.
///
/// # Errors
///
/// Returns a validation error naming the index of the first non-finite value.
pub fn normalize_points(
    raw: &[RawPoint],
    base_iteration: Option<u32>,
    now: DateTime<Utc>,
) -> Result<Vec<DataPoint>> {
    raw.iter()
        .enumerate()
        .map(|(index, item)| {
            let offset = u32::try_from(index).unwrap_or(u32::MAX);
            let sequential = base_iteration.unwrap_or(0).saturating_add(offset);
            let point = match item {
                RawPoint::Scalar(value) => {
                    DataPoint::new(*value, now).map(|p| p.with_iteration(sequential))
                }
                RawPoint::Record(record) => {
                    DataPoint::new(record.value, record.timestamp.unwrap_or(now)).map(|p| {
                        let iteration = record
                            .iteration
                            .or_else(|| base_iteration.map(|_| sequential));
                        DataPoint {
                            metadata: record.metadata.clone(),
                            ..p.with_iteration_opt(iteration)
                        }
                    })
                }
            };
            point.map_err(|e| {
                SpeedgateError::validation(format!("data[{index}]"), e.to_string())
            })
        })
        .collect()
}

/// Map one prober record to `(metric, point)` pairs.
///
/// Every record yields a `test_success` point (1 or 0). Speeds and the
/// other numeric fields are only taken from successful records; speed goes
/// to `download_speed` or `upload_speed` by `test_type`.
///
/// # Errors
///
/// Returns a validation error if a numeric field is NaN or infinite.
pub fn record_points(
    record: &MeasurementRecord,
    now: DateTime<Utc>,
) -> Result<Vec<(&'static str, DataPoint)>> {
    let timestamp = record.timestamp.unwrap_or(now);
    let success = record.is_success();

    let mut metadata = Map::new();
    if let Some(server) = &record.server {
        metadata.insert("server".to_string(), Value::from(server.clone()));
    }
    if let Some(port) = record.port {
        metadata.insert("port".to_string(), Value::from(port));
    }
    if let Some(server_type) = &record.server_type {
        metadata.insert("server_type".to_string(), Value::from(server_type.clone()));
    }
    if let Some(scenario_id) = &record.scenario_id {
        metadata.insert("scenario_id".to_string(), Value::from(scenario_id.clone()));
    }
    if let Some(test_type) = &record.test_type {
        metadata.insert("test_type".to_string(), Value::from(test_type.clone()));
    }

    let make = |value: f64| -> Result<DataPoint> {
        let point = DataPoint::new(value, timestamp)?.with_iteration_opt(record.iteration);
        Ok(DataPoint {
            metadata: metadata.clone(),
            ..point
        })
    };

    let mut points = vec![(TEST_SUCCESS, make(if success { 1.0 } else { 0.0 })?)];
    if !success {
        return Ok(points);
    }

    if let Some(mbps) = record.mbps {
        match record.test_type.as_deref().map(str::to_lowercase).as_deref() {
            Some("download") => points.push((DOWNLOAD_SPEED, make(mbps)?)),
            Some("upload") => points.push((UPLOAD_SPEED, make(mbps)?)),
            _ => {}
        }
    }
    let optional = [
        (JITTER, record.jitter_ms),
        (RETRANSMITS, record.retransmits),
        (BYTES, record.bytes),
        (BITS_PER_SECOND, record.bits_per_second),
    ];
    for (metric, value) in optional {
        if let Some(value) = value {
            points.push((metric, make(value)?));
        }
    }
    Ok(points)
}

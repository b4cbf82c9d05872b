#![allow(dead_code)]

use speedgate::model::MeasurementRecord;
use std::sync::Once;
use std::time::Instant;
use tracing::info;

pub mod cli;
pub mod fixtures;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        speedgate::logging::init_test_logging();
    });
}

pub struct TestLogGuard {
    name: String,
    start: Instant,
}

impl TestLogGuard {
    fn new(name: &str) -> Self {
        init_test_logging();
        info!("{name}: starting");
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for TestLogGuard {
    fn drop(&mut self) {
        info!(
            "{}: assertions passed (elapsed {:?})",
            self.name,
            self.start.elapsed()
        );
    }
}

pub fn test_log(name: &str) -> TestLogGuard {
    TestLogGuard::new(name)
}

/// A successful download record for `scenario_id` at `iteration`.
pub fn download(scenario_id: &str, iteration: u32, mbps: f64) -> MeasurementRecord {
    MeasurementRecord {
        scenario_id: Some(scenario_id.to_string()),
        iteration: Some(iteration),
        server: Some("iperf.example.net".to_string()),
        port: Some(5201),
        test_type: Some("download".to_string()),
        status: "success".to_string(),
        mbps: Some(mbps),
        bits_per_second: Some(mbps * 1_000_000.0),
        ..MeasurementRecord::default()
    }
}

//! Configuration management for `speedgate`.
//!
//! The scenario document lists scenarios and global settings. Settings are
//! resolved from layers, highest precedence wins:
//! 1. CLI overrides
//! 2. Environment variables (`SG_*`)
//! 3. Document `global_settings`
//! 4. Defaults

mod validate;

pub use validate::{CheckReport, validate_document};

use crate::error::{Result, SpeedgateError};
use crate::model::Expectation;
use crate::scheduler::{ExecutionMode, ScheduleConfig, ScheduleMode};
use crate::util::time::parse_start_time;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default scheduler poll quantum.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Protocol tags with a built-in executor.
pub const KNOWN_PROTOCOLS: &[&str] = &["speed_test", "voip_test"];

const KEY_LOG_LEVEL: &str = "log-level";
const KEY_POLL_INTERVAL: &str = "poll-interval-ms";
const KEY_EXECUTION: &str = "execution";
const KEY_REPORT_PATH: &str = "report-path";

/// Top-level scenario document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioDocument {
    #[serde(default)]
    pub global_settings: GlobalSettings,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl ScenarioDocument {
    /// Find a scenario by id.
    #[must_use]
    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Scenarios with `enabled: true`.
    pub fn enabled(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter().filter(|s| s.enabled)
    }
}

/// Document-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalSettings {
    /// trace | debug | info | warn | error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Where an external reporter writes results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    /// sequential (default) | concurrent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionMode>,
    /// Scheduler poll quantum in milliseconds (default 1000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

/// One independently schedulable test scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Protocol tag selecting the test executor, e.g. `speed_test`
    pub protocol: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Free-form parameters handed to the test executor
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub expectations: Vec<Expectation>,
}

impl Scenario {
    /// Minimal enabled scenario with a `once` schedule.
    #[must_use]
    pub fn new(id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            protocol: protocol.into(),
            enabled: true,
            schedule: ScheduleConfig::default(),
            parameters: Map::new(),
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    /// Parse this scenario's schedule block.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleConfig` if the block is malformed.
    pub fn schedule_mode(&self) -> Result<ScheduleMode> {
        ScheduleMode::from_config(&self.schedule, &self.id)
    }

    /// Explicit start time, if the schedule block gives one.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleConfig` if `start_time` cannot be parsed.
    pub fn start_time(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        self.schedule
            .start_time
            .as_deref()
            .map_or(Ok(None), |s| parse_start_time(s, now))
            .map_err(|e| SpeedgateError::ScheduleConfig {
                scenario_id: self.id.clone(),
                reason: e.to_string(),
            })
    }

    /// Expectations evaluated once, after the final firing.
    pub fn scenario_expectations(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.iter().filter(|e| is_scenario_scoped(e))
    }

    /// Expectations evaluated on every firing.
    pub fn iteration_expectations(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.iter().filter(|e| !is_scenario_scoped(e))
    }
}

fn is_scenario_scoped(expectation: &Expectation) -> bool {
    expectation
        .evaluation_scope
        .as_deref()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("scenario"))
}

/// Load a scenario document. `.yaml`/`.yml` files are YAML, anything else JSON.
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file is missing, or a parse error.
pub fn load_document(path: &Path) -> Result<ScenarioDocument> {
    if !path.exists() {
        return Err(SpeedgateError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let document = if is_yaml {
        serde_yaml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };
    tracing::debug!(path = %path.display(), "Loaded scenario document");
    Ok(document)
}

/// JSON Schema for the scenario document.
#[must_use]
pub fn json_schema() -> Value {
    let schema = schemars::schema_for!(ScenarioDocument);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

/// One layer of settings, keyed by kebab-case name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsLayer {
    pub values: HashMap<String, String>,
}

impl SettingsLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Build a layer from a document's `global_settings`.
    #[must_use]
    pub fn from_document(settings: &GlobalSettings) -> Self {
        let mut layer = Self::default();
        if let Some(level) = &settings.log_level {
            layer.set(KEY_LOG_LEVEL, level.clone());
        }
        if let Some(ms) = settings.poll_interval_ms {
            layer.set(KEY_POLL_INTERVAL, ms.to_string());
        }
        if let Some(execution) = settings.execution {
            layer.set(KEY_EXECUTION, execution.as_str());
        }
        if let Some(path) = &settings.report_path {
            layer.set(KEY_REPORT_PATH, path.clone());
        }
        layer
    }

    /// Build a layer from `SG_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Build a layer from an environment lookup function.
    #[must_use]
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut layer = Self::default();
        for (var, key) in [
            ("SG_LOG_LEVEL", KEY_LOG_LEVEL),
            ("SG_POLL_INTERVAL_MS", KEY_POLL_INTERVAL),
            ("SG_EXECUTION", KEY_EXECUTION),
            ("SG_REPORT_PATH", KEY_REPORT_PATH),
        ] {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                layer.set(key, value);
            }
        }
        layer
    }
}

/// Built-in defaults.
#[must_use]
pub fn default_layer() -> SettingsLayer {
    let mut layer = SettingsLayer::default();
    layer.set(KEY_POLL_INTERVAL, DEFAULT_POLL_INTERVAL_MS.to_string());
    layer.set(KEY_EXECUTION, ExecutionMode::default().as_str());
    layer
}

/// CLI overrides for settings (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub execution: Option<ExecutionMode>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> SettingsLayer {
        let mut layer = SettingsLayer::default();
        if let Some(level) = &self.log_level {
            layer.set(KEY_LOG_LEVEL, level.clone());
        }
        if let Some(ms) = self.poll_interval_ms {
            layer.set(KEY_POLL_INTERVAL, ms.to_string());
        }
        if let Some(execution) = self.execution {
            layer.set(KEY_EXECUTION, execution.as_str());
        }
        layer
    }
}

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_level: Option<String>,
    pub execution: ExecutionMode,
    pub poll_interval: Duration,
    pub report_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            execution: ExecutionMode::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            report_path: None,
        }
    }
}

impl Settings {
    /// Interpret a merged layer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unparsable poll interval or
    /// execution mode.
    pub fn from_layer(layer: &SettingsLayer) -> Result<Self> {
        let poll_ms = match layer.get(KEY_POLL_INTERVAL) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                SpeedgateError::Config(format!("invalid poll interval '{raw}' (milliseconds)"))
            })?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };
        if poll_ms == 0 {
            return Err(SpeedgateError::Config(
                "poll interval must be at least 1 ms".to_string(),
            ));
        }
        let execution = layer
            .get(KEY_EXECUTION)
            .map_or(Ok(ExecutionMode::default()), str::parse)?;

        Ok(Self {
            log_level: layer.get(KEY_LOG_LEVEL).map(str::to_string),
            execution,
            poll_interval: Duration::from_millis(poll_ms),
            report_path: layer.get(KEY_REPORT_PATH).map(PathBuf::from),
        })
    }
}

/// Resolve settings from every layer.
///
/// # Errors
///
/// Returns an error if the merged values cannot be interpreted.
pub fn resolve_settings(
    document: &GlobalSettings,
    env_layer: &SettingsLayer,
    cli: &CliOverrides,
) -> Result<Settings> {
    let merged = SettingsLayer::merge_layers(&[
        default_layer(),
        SettingsLayer::from_document(document),
        env_layer.clone(),
        cli.as_layer(),
    ]);
    Settings::from_layer(&merged)
}

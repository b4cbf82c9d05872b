/// Two enabled scenarios with bounded schedules and one disabled scenario.
pub const DOCUMENT_JSON: &str = r#"{
    "global_settings": {"log_level": "info", "poll_interval_ms": 10},
    "scenarios": [
        {
            "id": "download_check",
            "description": "Download throughput against the lab server",
            "protocol": "speed_test",
            "enabled": true,
            "schedule": {"mode": "once"},
            "parameters": {"server": "iperf.example.net", "duration": 10},
            "expectations": [
                {"metric": "download_speed", "aggregation": "p95", "operator": "gte", "value": 80, "unit": "Mbps"},
                {"metric": "download_speed", "aggregation": "mean", "operator": "between", "value": [50, 100], "inclusive": "both"},
                {"metric": "test_success", "operator": "eq", "value": 1}
            ]
        },
        {
            "id": "voip_quality",
            "protocol": "voip_test",
            "enabled": true,
            "schedule": {"mode": "once"},
            "expectations": [
                {"metric": "jitter", "aggregation": "max", "operator": "lt", "value": 30}
            ]
        },
        {
            "id": "nightly",
            "protocol": "speed_test",
            "enabled": false,
            "schedule": {"mode": "daily", "time": "02:00"}
        }
    ]
}"#;

/// The same kind of document in YAML, with a malformed schedule.
pub const BROKEN_YAML: &str = r#"
scenarios:
  - id: weekly_check
    protocol: speed_test
    enabled: true
    schedule:
      mode: weekly
      day: funday
    expectations:
      - metric: download_speed
        operator: approx
        value: 80
"#;

/// Wrongly typed fields in three expectations and one schedule, next to
/// well-formed siblings.
pub const MIXED_QUALITY_JSON: &str = r#"{
    "scenarios": [
        {
            "id": "download_check",
            "protocol": "speed_test",
            "enabled": true,
            "expectations": [
                {"metric": "download_speed", "aggregation": "p95", "operator": "gte", "value": 80},
                {"metric": "download_speed", "operator": "eq", "value": [1, 2, 3]},
                {"metric": "download_speed", "operator": "eq", "value": 72.5, "tolerance": "loose"},
                {
                    "metric": "download_speed",
                    "operator": "gte",
                    "value": 50,
                    "evaluation_scope": "windowed",
                    "window_minutes": "soon"
                },
                {"metric": "download_speed", "aggregation": "max", "operator": "lt", "value": 100}
            ]
        },
        {
            "id": "flaky_schedule",
            "protocol": "speed_test",
            "enabled": true,
            "schedule": {"mode": "every", "interval": "often"}
        },
        {
            "id": "voip_quality",
            "protocol": "voip_test",
            "enabled": true,
            "expectations": [
                {"metric": "jitter", "aggregation": "max", "operator": "lt", "value": 30}
            ]
        }
    ]
}"#;

/// Ten download measurements (50..95 Mbps) plus jitter samples.
pub fn measurements_jsonl() -> String {
    let mut lines = Vec::new();
    for i in 1..=10u32 {
        let mbps = 45 + 5 * i;
        lines.push(format!(
            r#"{{"scenario_id": "download_check", "iteration": 1, "test_type": "download", "server": "iperf.example.net", "port": 5201, "mbps": {mbps}}}"#
        ));
    }
    for jitter in [4.5, 6.0, 12.25] {
        lines.push(format!(
            r#"{{"scenario_id": "voip_quality", "iteration": 1, "test_type": "download", "jitter_ms": {jitter}, "mbps": 1.2}}"#
        ));
    }
    lines.join("\n")
}

//! Logging setup for the `sg` binary and tests.
//!
//! `RUST_LOG` wins when set. Otherwise the level comes from `-q` (error),
//! `-v` (debug), `-vv` (trace), then the configured level, then `warn`.

use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const DEFAULT_LEVEL: &str = "warn";

/// Level implied by the flags and the configured level.
#[must_use]
pub fn effective_level(verbose: u8, quiet: bool, configured: Option<&str>) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => configured
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map_or_else(|| DEFAULT_LEVEL.to_string(), str::to_lowercase),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber: text on stderr, plus JSON lines to
/// `log_file` when given.
///
/// # Errors
///
/// Returns an error if the level is not a valid filter, the log file cannot
/// be opened, or a subscriber is already installed.
pub fn init_logging(
    verbose: u8,
    quiet: bool,
    log_file: Option<&Path>,
    configured: Option<&str>,
) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = effective_level(verbose, quiet, configured);
            EnvFilter::try_new(&level).with_context(|| format!("invalid log level '{level}'"))?
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("logging already initialized")?;
    Ok(())
}

/// Route logs to the test harness; safe to call from every test.
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_configured_level() {
        assert_eq!(effective_level(0, false, None), "warn");
        assert_eq!(effective_level(0, false, Some("INFO")), "info");
        assert_eq!(effective_level(1, false, Some("info")), "debug");
        assert_eq!(effective_level(3, false, None), "trace");
        assert_eq!(effective_level(2, true, Some("debug")), "error");
    }
}

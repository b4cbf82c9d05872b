//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    protocols: &'a [&'a str],
}

fn build_kind() -> &'static str {
    if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    }
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = build_kind();

    if json {
        let output = VersionOutput {
            version,
            build,
            protocols: crate::config::KNOWN_PROTOCOLS,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("sg version {version} ({build})");
    Ok(())
}

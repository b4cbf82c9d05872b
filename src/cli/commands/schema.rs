//! Schema command: print the scenario document's JSON Schema.

use crate::config;
use crate::error::Result;

/// Execute the schema command. The schema is JSON regardless of `--json`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config::json_schema())?);
    Ok(())
}

//! Check command: validate the scenario document.

use crate::config::{self, ScenarioDocument};
use crate::error::Result;

/// Execute the check command.
///
/// # Errors
///
/// Returns the collected validation errors if the document is invalid.
pub fn execute(document: &ScenarioDocument, json: bool) -> Result<()> {
    let report = config::validate_document(document)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!(
        "OK: {} scenarios ({} enabled), {} expectations",
        report.scenarios, report.enabled, report.expectations
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

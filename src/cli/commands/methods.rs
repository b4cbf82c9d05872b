//! Methods command: list aggregation methods, operators and scopes.

use crate::error::Result;
use crate::metrics::{self, Catalogue};
use std::fmt::Write as _;

/// Execute the methods command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let catalogue = metrics::describe();
    if json {
        println!("{}", serde_json::to_string_pretty(&catalogue)?);
    } else {
        print!("{}", render(&catalogue));
    }
    Ok(())
}

fn render(catalogue: &Catalogue) -> String {
    let mut out = String::from("Aggregation methods:\n");
    for method in &catalogue.aggregations {
        let _ = writeln!(
            out,
            "  {:<20} {} - {}",
            method.name, method.display_name, method.description
        );
    }

    out.push_str("\nOperators:\n");
    for op in &catalogue.operators {
        let _ = writeln!(
            out,
            "  {:<8} {:<4} {} - {}",
            op.name, op.symbol, op.display_name, op.description
        );
    }

    out.push_str("\nEvaluation scopes:\n");
    for scope in &catalogue.scopes {
        let _ = write!(out, "  {:<24} {}", scope.name, scope.description);
        if !scope.parameters.is_empty() {
            let _ = write!(out, " [{}]", scope.parameters.join(", "));
        }
        out.push('\n');
    }
    out
}

//! Command implementations, one module per subcommand.

pub mod check;
pub mod completions;
pub mod evaluate;
pub mod methods;
pub mod run;
pub mod schema;
pub mod status;
pub mod version;

use crate::config::ScenarioDocument;
use crate::error::{Result, SpeedgateError};

/// Pick scenarios by id, or all of them when `ids` is empty.
///
/// # Errors
///
/// Returns an unknown-name error for an id the document does not define.
pub fn select_scenarios(
    document: &ScenarioDocument,
    ids: &[String],
) -> Result<Vec<crate::config::Scenario>> {
    if ids.is_empty() {
        return Ok(document.scenarios.clone());
    }
    ids.iter()
        .map(|id| {
            document.scenario(id).cloned().ok_or_else(|| {
                let known: Vec<&str> = document.scenarios.iter().map(|s| s.id.as_str()).collect();
                SpeedgateError::unknown_name("scenario", id.as_str(), &known)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;

    #[test]
    fn select_by_id_or_all() {
        let doc = ScenarioDocument {
            scenarios: vec![
                Scenario::new("a", "speed_test"),
                Scenario::new("b", "voip_test"),
            ],
            ..ScenarioDocument::default()
        };
        assert_eq!(select_scenarios(&doc, &[]).unwrap().len(), 2);
        let picked = select_scenarios(&doc, &["b".to_string()]).unwrap();
        assert_eq!(picked[0].id, "b");
        let err = select_scenarios(&doc, &["c".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown scenario: 'c'. Valid values: a, b");
    }
}

//! Stage B: heuristic catalog matches over fields and endpoint shapes.

use crate::catalog::HeuristicCatalog;
use crate::parser::ParsedSpec;
use devmatrix_core::model::validation::ValidationRuleSet;

/// Run the versioned heuristic catalog over every field and endpoint.
#[must_use]
pub fn extract(catalog: &HeuristicCatalog, parsed: &ParsedSpec) -> ValidationRuleSet {
    let mut rules = ValidationRuleSet::new();

    for entity in &parsed.entities {
        for field in &entity.fields {
            for rule in catalog.field_rules(entity, field) {
                rules.push(rule);
            }
        }
    }

    for endpoint in &parsed.endpoints {
        for rule in catalog.endpoint_rules(&parsed.entities, endpoint) {
            rules.push(rule);
        }
    }

    rules
}

//! The versioned heuristic catalog behind the pattern extraction stage.
//!
//! Heuristics are keyed by type names, field names, and HTTP semantics.
//! Every emitted rule records the catalog version in its rationale so a
//! rule set can be traced back to the catalog that produced it.

use devmatrix_core::model::endpoint::{Endpoint, HttpMethod};
use devmatrix_core::model::entity::{Entity, FieldDef, FieldType};
use devmatrix_core::model::validation::{Provenance, RuleKind, ValidationRule};

/// Catalog revision; bumped whenever a heuristic is added or retuned.
pub const CATALOG_VERSION: &str = "1.4.0";

/// Field- and endpoint-shape heuristics with a version stamp.
#[derive(Debug, Clone)]
pub struct HeuristicCatalog {
    version: String,
}

impl Default for HeuristicCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HeuristicCatalog {
    /// The built-in catalog at [`CATALOG_VERSION`].
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
        }
    }

    /// The catalog version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    fn provenance(&self, hint: &str) -> Provenance {
        Provenance::pattern(format!("catalog v{}: {hint}", self.version))
    }

    /// Heuristic rules for one field.
    #[must_use]
    pub fn field_rules(&self, entity: &Entity, field: &FieldDef) -> Vec<ValidationRule> {
        let mut rules = Vec::new();
        let name = field.name.to_lowercase();

        match field.field_type {
            FieldType::Uuid => rules.push(
                ValidationRule::new(
                    &entity.name,
                    &field.name,
                    RuleKind::Format,
                    self.provenance("uuid-typed field"),
                )
                .with_condition("format: uuid"),
            ),
            FieldType::DateTime => rules.push(
                ValidationRule::new(
                    &entity.name,
                    &field.name,
                    RuleKind::Format,
                    self.provenance("datetime-typed field"),
                )
                .with_condition("format: iso8601"),
            ),
            _ => {}
        }

        if name.contains("email") {
            rules.push(
                ValidationRule::new(
                    &entity.name,
                    &field.name,
                    RuleKind::Format,
                    self.provenance("email-named field"),
                )
                .with_condition("format: email"),
            );
        } else if name.contains("url") || name.contains("link") {
            rules.push(
                ValidationRule::new(
                    &entity.name,
                    &field.name,
                    RuleKind::Format,
                    self.provenance("url-named field"),
                )
                .with_condition("format: url"),
            );
        }

        if field.field_type == FieldType::Integer
            && ["quantity", "stock", "count", "amount"]
                .iter()
                .any(|k| name.contains(k))
        {
            rules.push(
                ValidationRule::new(
                    &entity.name,
                    &field.name,
                    RuleKind::Range,
                    self.provenance("countable integer field"),
                )
                .with_condition("value >= 0"),
            );
        }

        if ["status", "state"].contains(&name.as_str()) && !field.constraints.one_of.is_empty() {
            rules.push(
                ValidationRule::new(
                    &entity.name,
                    &field.name,
                    RuleKind::StatusTransition,
                    self.provenance("enumerated status field"),
                )
                .with_condition(format!(
                    "transitions restricted to: {}",
                    field.constraints.one_of.join(", ")
                )),
            );
        }

        rules
    }

    /// Heuristic rules for one endpoint, resolved against the known
    /// entities by route resource.
    #[must_use]
    pub fn endpoint_rules(&self, entities: &[Entity], endpoint: &Endpoint) -> Vec<ValidationRule> {
        let mut rules = Vec::new();
        let Some(entity) = entity_for_path(entities, &endpoint.path) else {
            return rules;
        };

        // POST with a 409 response implies a uniqueness constraint; prefer
        // an email field, else any field already flagged unique.
        if endpoint.method == HttpMethod::Post && endpoint.has_status(409) {
            let target = entity
                .fields
                .iter()
                .find(|f| f.name.to_lowercase().contains("email"))
                .or_else(|| entity.fields.iter().find(|f| f.unique));
            if let Some(field) = target {
                rules.push(
                    ValidationRule::new(
                        &entity.name,
                        &field.name,
                        RuleKind::Uniqueness,
                        self.provenance("POST returning 409 conflict"),
                    )
                    .with_condition(format!("unique constraint on {} column", field.name)),
                );
            }
        }

        // 401/403 responses imply the operation is authorization-guarded.
        if endpoint.has_status(401) || endpoint.has_status(403) {
            rules.push(
                ValidationRule::new(
                    &entity.name,
                    "access",
                    RuleKind::WorkflowConstraint,
                    self.provenance("endpoint returning 401/403"),
                )
                .with_condition("authenticated and authorized access required"),
            );
        }

        rules
    }
}

/// Resolve the entity a route path operates on: first path segment,
/// singularized, compared case-insensitively.
#[must_use]
pub fn entity_for_path<'a>(entities: &'a [Entity], path: &str) -> Option<&'a Entity> {
    let resource = path.trim_start_matches('/').split('/').next()?;
    if resource.is_empty() {
        return None;
    }
    let singular = resource.trim_end_matches('s').to_lowercase();
    let plural = resource.to_lowercase();
    entities.iter().find(|e| {
        let lower = e.name.to_lowercase();
        lower == singular || lower == plural
    })
}

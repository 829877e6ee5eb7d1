//! Stage A: rules declared explicitly on entity fields.

use crate::parser::ParsedSpec;
use devmatrix_core::model::validation::{Provenance, RuleKind, ValidationRule, ValidationRuleSet};

/// Walk every entity field and emit one rule per explicit constraint:
/// required becomes presence, format/pattern becomes format, unique becomes
/// uniqueness, min/max become range, and foreign keys become relationship.
#[must_use]
pub fn extract(parsed: &ParsedSpec) -> ValidationRuleSet {
    let mut rules = ValidationRuleSet::new();

    for entity in &parsed.entities {
        for field in &entity.fields {
            if field.required {
                rules.push(
                    ValidationRule::new(
                        &entity.name,
                        &field.name,
                        RuleKind::Presence,
                        Provenance::direct("declared required"),
                    )
                    .with_message(format!("{} is required", field.name)),
                );
            }

            if field.unique {
                rules.push(ValidationRule::new(
                    &entity.name,
                    &field.name,
                    RuleKind::Uniqueness,
                    Provenance::direct("declared unique"),
                ));
            }

            if let Some(format) = field.constraints.format.as_deref() {
                rules.push(
                    ValidationRule::new(
                        &entity.name,
                        &field.name,
                        RuleKind::Format,
                        Provenance::direct("declared format"),
                    )
                    .with_condition(format!("format: {format}")),
                );
            }

            let length_bounds = match (field.constraints.min_length, field.constraints.max_length)
            {
                (Some(min), Some(max)) => Some(format!("len >= {min} AND len <= {max}")),
                (Some(min), None) => Some(format!("len >= {min}")),
                (None, Some(max)) => Some(format!("len <= {max}")),
                (None, None) => None,
            };
            let numeric_bounds = match (field.constraints.minimum, field.constraints.maximum) {
                (Some(min), Some(max)) => Some(format!("value >= {min} AND value <= {max}")),
                (Some(min), None) => Some(format!("value >= {min}")),
                (None, Some(max)) => Some(format!("value <= {max}")),
                (None, None) => None,
            };
            if let Some(condition) = length_bounds.or(numeric_bounds) {
                rules.push(
                    ValidationRule::new(
                        &entity.name,
                        &field.name,
                        RuleKind::Range,
                        Provenance::direct("declared bounds"),
                    )
                    .with_condition(condition),
                );
            }

            if !field.constraints.one_of.is_empty() {
                rules.push(
                    ValidationRule::new(
                        &entity.name,
                        &field.name,
                        RuleKind::Range,
                        Provenance::direct("declared enumeration"),
                    )
                    .with_condition(format!(
                        "value in [{}]",
                        field.constraints.one_of.join(", ")
                    )),
                );
            }

            if let Some(target) = field.constraints.references.as_deref() {
                rules.push(
                    ValidationRule::new(
                        &entity.name,
                        &field.name,
                        RuleKind::Relationship,
                        Provenance::direct("foreign key reference"),
                    )
                    .with_condition(format!("{} must exist", target))
                    .with_message(format!("referenced {target} does not exist")),
                );
            }
        }
    }

    rules
}

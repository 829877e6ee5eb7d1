//! Deduplication: the sole authority on which rule survives.
//!
//! Rules are grouped by `(entity, attribute, kind)`. Within a group the
//! highest-provenance rule survives (direct > pattern > llm), conditions are
//! merged in ascending provenance order with `AND`, and the highest
//! confidence in the group is inherited.

use devmatrix_core::model::validation::{ValidationRule, ValidationRuleSet};

/// Collapse duplicate rules into one survivor per identity triple.
///
/// Output order is deterministic: groups appear in first-occurrence order of
/// their triple in the input.
#[must_use]
pub fn dedupe(rules: ValidationRuleSet) -> ValidationRuleSet {
    let all: Vec<ValidationRule> = rules.into_rules();
    let mut order: Vec<(String, String, devmatrix_core::model::validation::RuleKind)> = Vec::new();
    let mut groups: std::collections::HashMap<_, Vec<ValidationRule>> =
        std::collections::HashMap::new();

    for rule in all {
        let key = rule.key();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(rule);
    }

    let mut out = ValidationRuleSet::new();
    for key in order {
        if let Some(group) = groups.remove(&key) {
            out.push(collapse(group));
        }
    }
    out
}

fn collapse(mut group: Vec<ValidationRule>) -> ValidationRule {
    // Ascending provenance order; stable, so same-source rules keep their
    // stage emission order.
    group.sort_by_key(|r| r.provenance.source.priority());

    let best_confidence = group
        .iter()
        .map(|r| r.provenance.confidence)
        .fold(0.0f64, f64::max);

    let mut conditions: Vec<String> = Vec::new();
    for rule in &group {
        if let Some(cond) = rule.condition.as_deref() {
            let cond = cond.trim();
            if !cond.is_empty() && !conditions.iter().any(|c| c == cond) {
                conditions.push(cond.to_string());
            }
        }
    }

    // The survivor is the highest-priority rule; sort put it last.
    #[allow(clippy::unwrap_used)]
    let mut survivor = group.pop().unwrap();
    survivor.condition = if conditions.is_empty() {
        None
    } else {
        Some(conditions.join(" AND "))
    };
    survivor.provenance.confidence = best_confidence;
    survivor
}

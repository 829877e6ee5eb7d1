//! Validation rules and their provenance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The kind of constraint a validation rule expresses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Field must be present
    Presence,
    /// Field must match a named format
    Format,
    /// Values must be unique across records
    Uniqueness,
    /// Length or numeric range bound
    Range,
    /// Foreign-key integrity
    Relationship,
    /// Inventory-style quantity bound across entities
    StockConstraint,
    /// Cross-entity workflow precondition
    WorkflowConstraint,
    /// Legal state-machine transition
    StatusTransition,
}

impl RuleKind {
    /// Stable snake_case tag.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::Format => "format",
            Self::Uniqueness => "uniqueness",
            Self::Range => "range",
            Self::Relationship => "relationship",
            Self::StockConstraint => "stock_constraint",
            Self::WorkflowConstraint => "workflow_constraint",
            Self::StatusTransition => "status_transition",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which extraction stage produced a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// Explicit constraint on an entity field
    Direct,
    /// Heuristic catalog match
    Pattern,
    /// LLM inference
    Llm,
}

impl RuleSource {
    /// Deduplication priority: direct > pattern > llm.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Self::Direct => 3,
            Self::Pattern => 2,
            Self::Llm => 1,
        }
    }
}

/// Origin and confidence of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Producing stage
    pub source: RuleSource,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable justification
    pub rationale: String,
}

impl Provenance {
    /// Provenance for a directly declared constraint.
    #[must_use]
    pub fn direct(rationale: impl Into<String>) -> Self {
        Self {
            source: RuleSource::Direct,
            confidence: 0.95,
            rationale: rationale.into(),
        }
    }

    /// Provenance for a heuristic catalog match.
    #[must_use]
    pub fn pattern(rationale: impl Into<String>) -> Self {
        Self {
            source: RuleSource::Pattern,
            confidence: 0.85,
            rationale: rationale.into(),
        }
    }

    /// Provenance for an LLM-inferred rule.
    #[must_use]
    pub fn llm(confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            source: RuleSource::Llm,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }
}

/// A single validation rule over one entity attribute.
///
/// The triple `(entity, attribute, kind)` is the rule's identity; after
/// deduplication it is unique within a rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Owning entity name
    pub entity: String,
    /// Attribute name; empty for entity-level rules
    pub attribute: String,
    /// Constraint kind
    pub kind: RuleKind,
    /// Machine-interpretable predicate, if one was stated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// User-facing error message
    pub error_message: String,
    /// Origin and confidence
    pub provenance: Provenance,
}

impl ValidationRule {
    /// Create a rule with a generated error message.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        kind: RuleKind,
        provenance: Provenance,
    ) -> Self {
        let entity = entity.into();
        let attribute = attribute.into();
        let error_message = format!("{entity}.{attribute} violates {kind} constraint");
        Self {
            entity,
            attribute,
            kind,
            condition: None,
            error_message,
            provenance,
        }
    }

    /// Set the condition predicate.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Set the user-facing message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// The deduplication identity.
    #[must_use]
    pub fn key(&self) -> (String, String, RuleKind) {
        (self.entity.clone(), self.attribute.clone(), self.kind)
    }
}

/// A collection of validation rules.
///
/// The container itself does not enforce uniqueness; the extractor's
/// deduplication pass is the sole authority on which rule survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRuleSet {
    rules: Vec<ValidationRule>,
}

impl ValidationRuleSet {
    /// An empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a vector of rules.
    #[must_use]
    pub fn from_rules(rules: Vec<ValidationRule>) -> Self {
        Self { rules }
    }

    /// Append a rule.
    pub fn push(&mut self, rule: ValidationRule) {
        self.rules.push(rule);
    }

    /// Absorb all rules from another set.
    pub fn extend(&mut self, other: ValidationRuleSet) {
        self.rules.extend(other.rules);
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate the rules in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationRule> {
        self.rules.iter()
    }

    /// All rules, consumed.
    #[must_use]
    pub fn into_rules(self) -> Vec<ValidationRule> {
        self.rules
    }

    /// Look up a rule by its identity triple.
    #[must_use]
    pub fn get(&self, entity: &str, attribute: &str, kind: RuleKind) -> Option<&ValidationRule> {
        self.rules
            .iter()
            .find(|r| r.entity == entity && r.attribute == attribute && r.kind == kind)
    }

    /// Group rules by identity triple, preserving insertion order within
    /// each group.
    #[must_use]
    pub fn grouped(&self) -> HashMap<(String, String, RuleKind), Vec<&ValidationRule>> {
        let mut groups: HashMap<(String, String, RuleKind), Vec<&ValidationRule>> =
            HashMap::new();
        for rule in &self.rules {
            groups.entry(rule.key()).or_default().push(rule);
        }
        groups
    }
}

impl IntoIterator for ValidationRuleSet {
    type Item = ValidationRule;
    type IntoIter = std::vec::IntoIter<ValidationRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

impl FromIterator<ValidationRule> for ValidationRuleSet {
    fn from_iter<T: IntoIterator<Item = ValidationRule>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

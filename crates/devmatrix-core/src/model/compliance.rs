//! Ground truth and compliance reporting.

use crate::model::endpoint::HttpMethod;
use crate::model::validation::RuleKind;
use serde::{Deserialize, Serialize};

/// Coverage weights: entities 0.2, endpoints 0.4, validations 0.4.
pub const ENTITY_WEIGHT: f64 = 0.2;
/// Endpoint share of the overall score.
pub const ENDPOINT_WEIGHT: f64 = 0.4;
/// Validation share of the overall score.
pub const VALIDATION_WEIGHT: f64 = 0.4;

/// Expected facts about the generated application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Expected entity names
    #[serde(default)]
    pub entities: Vec<String>,
    /// Expected (method, path) pairs
    #[serde(default)]
    pub endpoints: Vec<(HttpMethod, String)>,
    /// Expected validation rule identity triples
    #[serde(default)]
    pub validations: Vec<RuleTriple>,
}

/// The identity triple of an expected validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleTriple {
    /// Owning entity
    pub entity: String,
    /// Attribute name
    pub attribute: String,
    /// Constraint kind
    pub kind: RuleKind,
}

impl RuleTriple {
    /// Construct a triple.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        kind: RuleKind,
    ) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            kind,
        }
    }
}

/// What went missing, for the repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A required entity is absent from the artifact
    MissingEntity,
    /// A required endpoint is absent
    MissingEndpoint,
    /// A required validation rule is absent
    MissingValidation,
    /// A response-serialization defect was detected
    SerializationDefect,
    /// The artifact could not be loaded at all
    ImportFailure,
}

/// One specific compliance failure with its locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceFailure {
    /// What kind of gap this is
    pub kind: FailureKind,
    /// Locator: entity name, `METHOD /path`, or `entity.attribute:kind`
    pub locator: String,
    /// Human-readable detail
    pub detail: String,
}

impl ComplianceFailure {
    /// Construct a failure record.
    #[must_use]
    pub fn new(kind: FailureKind, locator: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            detail: detail.into(),
        }
    }
}

/// Per-dimension coverage and the weighted overall score.
///
/// Coverage fractions are `None` when no ground truth was supplied (the
/// validator then runs in best-effort mode and `overall` reflects internal
/// consistency only).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Fraction of required entities present
    pub entity_coverage: Option<f64>,
    /// Fraction of required endpoints present
    pub endpoint_coverage: Option<f64>,
    /// Fraction of required validations present
    pub validation_coverage: Option<f64>,
    /// Weighted overall score in [0, 1]
    pub overall: f64,
    /// Specific gaps, in deterministic order
    #[serde(default)]
    pub failures: Vec<ComplianceFailure>,
    /// Endpoints present but not required; reported, never penalized
    #[serde(default)]
    pub extra_endpoints: Vec<String>,
}

impl ComplianceReport {
    /// Compute the weighted overall score from the three coverages, treating
    /// absent dimensions as fully covered for weighting purposes.
    #[must_use]
    pub fn weighted_overall(
        entity_coverage: Option<f64>,
        endpoint_coverage: Option<f64>,
        validation_coverage: Option<f64>,
    ) -> f64 {
        ENTITY_WEIGHT * entity_coverage.unwrap_or(1.0)
            + ENDPOINT_WEIGHT * endpoint_coverage.unwrap_or(1.0)
            + VALIDATION_WEIGHT * validation_coverage.unwrap_or(1.0)
    }

    /// The all-zero report returned when the artifact cannot be loaded.
    #[must_use]
    pub fn import_failure(detail: impl Into<String>) -> Self {
        Self {
            entity_coverage: Some(0.0),
            endpoint_coverage: Some(0.0),
            validation_coverage: Some(0.0),
            overall: 0.0,
            failures: vec![ComplianceFailure::new(
                FailureKind::ImportFailure,
                "<artifact>",
                detail,
            )],
            extra_endpoints: Vec::new(),
        }
    }

    /// Whether every dimension is fully covered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.overall >= 1.0 - f64::EPSILON
    }
}

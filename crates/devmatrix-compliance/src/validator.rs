//! Compliance scoring of a generated artifact.

use crate::introspect::{self, ArtifactSurface};
use devmatrix_core::model::compliance::{
    ComplianceFailure, ComplianceReport, FailureKind, GroundTruth,
};
use devmatrix_core::model::file_map::FileMap;
use std::collections::HashSet;
use tracing::debug;

/// Scores a generated file map against ground truth, or against internal
/// consistency when none was supplied.
#[derive(Debug, Clone, Default)]
pub struct ComplianceValidator;

impl ComplianceValidator {
    /// Create a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Produce the compliance report. Never errors: an unloadable artifact
    /// yields the all-zero `ImportFailure` report.
    #[must_use]
    pub fn validate(&self, files: &FileMap, ground_truth: Option<&GroundTruth>) -> ComplianceReport {
        let surface = match introspect::introspect(files) {
            Ok(surface) => surface,
            Err(err) => {
                debug!(error = %err, "artifact failed to load");
                return ComplianceReport::import_failure(err.to_string());
            }
        };

        let mut report = match ground_truth {
            Some(gt) => score_against_truth(&surface, gt),
            None => best_effort(&surface),
        };
        report.failures.extend(serialization_defects(files));
        report
    }
}

/// Datetime-bearing entities need a JSON encoder attached somewhere in the
/// artifact; flag the gap as a repairable defect. Does not affect coverage
/// scores.
fn serialization_defects(files: &FileMap) -> Vec<ComplianceFailure> {
    let uses_datetime = files.iter().any(|(path, contents)| {
        (path == "entities.py" || path.starts_with("models/"))
            && contents
                .as_text()
                .is_some_and(|t| t.contains("datetime") || t.contains("DateTime"))
    });
    let has_encoder = files
        .iter()
        .any(|(_, contents)| contents.as_text().is_some_and(|t| t.contains("json_encoders")));

    if uses_datetime && !has_encoder {
        vec![ComplianceFailure::new(
            FailureKind::SerializationDefect,
            "schemas.py",
            "datetime fields present but no json encoder is attached",
        )]
    } else {
        Vec::new()
    }
}

fn coverage(present: usize, required: usize) -> f64 {
    if required == 0 {
        1.0
    } else {
        present as f64 / required as f64
    }
}

fn score_against_truth(surface: &ArtifactSurface, gt: &GroundTruth) -> ComplianceReport {
    let mut failures = Vec::new();

    let present_entities: HashSet<&str> = surface.entities.iter().map(String::as_str).collect();
    let mut matched_entities = 0usize;
    for required in &gt.entities {
        if present_entities.contains(required.as_str()) {
            matched_entities += 1;
        } else {
            failures.push(ComplianceFailure::new(
                FailureKind::MissingEntity,
                required.clone(),
                format!("entity {required} not declared in the artifact"),
            ));
        }
    }

    let present_endpoints: HashSet<(String, String)> = surface
        .endpoints
        .iter()
        .map(|(m, p)| (m.to_string(), p.clone()))
        .collect();
    let mut matched_endpoints = 0usize;
    for (method, path) in &gt.endpoints {
        if present_endpoints.contains(&(method.to_string(), path.clone())) {
            matched_endpoints += 1;
        } else {
            failures.push(ComplianceFailure::new(
                FailureKind::MissingEndpoint,
                format!("{method} {path}"),
                format!("route {method} {path} not declared in the artifact"),
            ));
        }
    }
    // Extra endpoints are reported, never penalized.
    let required_endpoints: HashSet<(String, String)> = gt
        .endpoints
        .iter()
        .map(|(m, p)| (m.to_string(), p.clone()))
        .collect();
    let extra_endpoints: Vec<String> = surface
        .endpoints
        .iter()
        .filter(|(m, p)| !required_endpoints.contains(&(m.to_string(), p.clone())))
        .map(|(m, p)| format!("{m} {p}"))
        .collect();

    let present_validations: HashSet<(&str, &str, devmatrix_core::model::validation::RuleKind)> =
        surface
            .validations
            .iter()
            .map(|t| (t.entity.as_str(), t.attribute.as_str(), t.kind))
            .collect();
    let mut matched_validations = 0usize;
    for triple in &gt.validations {
        if present_validations.contains(&(
            triple.entity.as_str(),
            triple.attribute.as_str(),
            triple.kind,
        )) {
            matched_validations += 1;
        } else {
            failures.push(ComplianceFailure::new(
                FailureKind::MissingValidation,
                format!("{}.{}:{}", triple.entity, triple.attribute, triple.kind),
                format!(
                    "validation ({}, {}, {}) not registered in the artifact",
                    triple.entity, triple.attribute, triple.kind
                ),
            ));
        }
    }

    let entity_coverage = coverage(matched_entities, gt.entities.len());
    let endpoint_coverage = coverage(matched_endpoints, gt.endpoints.len());
    let validation_coverage = coverage(matched_validations, gt.validations.len());

    ComplianceReport {
        entity_coverage: Some(entity_coverage),
        endpoint_coverage: Some(endpoint_coverage),
        validation_coverage: Some(validation_coverage),
        overall: ComplianceReport::weighted_overall(
            Some(entity_coverage),
            Some(endpoint_coverage),
            Some(validation_coverage),
        ),
        failures,
        extra_endpoints,
    }
}

/// Best-effort mode: no ground truth, score internal consistency only.
///
/// Every endpoint should resolve to a declared entity and every validation
/// should name one.
fn best_effort(surface: &ArtifactSurface) -> ComplianceReport {
    let entities: HashSet<String> = surface
        .entities
        .iter()
        .map(|e| e.to_lowercase())
        .collect();

    let mut checks = 0usize;
    let mut consistent = 0usize;
    let mut failures = Vec::new();

    for (method, path) in &surface.endpoints {
        checks += 1;
        let resource = path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches('s')
            .to_lowercase();
        if entities.contains(&resource) {
            consistent += 1;
        } else {
            failures.push(ComplianceFailure::new(
                FailureKind::MissingEntity,
                format!("{method} {path}"),
                format!("route {method} {path} does not resolve to a declared entity"),
            ));
        }
    }

    for triple in &surface.validations {
        checks += 1;
        if entities.contains(&triple.entity.to_lowercase()) {
            consistent += 1;
        } else {
            failures.push(ComplianceFailure::new(
                FailureKind::MissingEntity,
                triple.entity.clone(),
                format!("validation references undeclared entity {}", triple.entity),
            ));
        }
    }

    ComplianceReport {
        entity_coverage: None,
        endpoint_coverage: None,
        validation_coverage: None,
        overall: if checks == 0 {
            1.0
        } else {
            consistent as f64 / checks as f64
        },
        failures,
        extra_endpoints: Vec::new(),
    }
}

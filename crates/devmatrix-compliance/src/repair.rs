//! The compliance-driven repair loop.
//!
//! Each compliance failure becomes a targeted repair applied as a
//! structure-aware edit, with the inference engine as fallback when an edit
//! cannot land. The file map is copy-on-write: every iteration produces a
//! candidate version that is committed only if overall compliance did not
//! regress. The loop stops at full coverage, after two consecutive
//! iterations without improvement (plateau), or at the iteration cap.

use crate::edits;
use crate::validator::ComplianceValidator;
use devmatrix_core::model::compliance::{
    ComplianceFailure, ComplianceReport, FailureKind, GroundTruth,
};
use devmatrix_core::model::context::StackDescriptor;
use devmatrix_core::model::endpoint::HttpMethod;
use devmatrix_core::model::file_map::FileMap;
use devmatrix_core::model::requirement::Domain;
use devmatrix_core::model::task::{AtomicTask, MODULE_TASK_LINE_BUDGET};
use devmatrix_core::model::validation::RuleKind;
use devmatrix_engine::InferenceEngine;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PLATEAU_BOUND: u32 = 2;
const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Coverage reached 1.0
    Complete,
    /// Two consecutive iterations without improvement
    Plateau,
    /// The iteration cap was reached
    IterationCap,
}

/// Result of the repair phase.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// The final (possibly repaired) file map
    pub files: FileMap,
    /// The final compliance report
    pub report: ComplianceReport,
    /// Iterations executed
    pub iterations: u32,
    /// Why the loop stopped
    pub reason: StopReason,
}

/// Iteratively applies targeted repairs against compliance failures.
pub struct RepairLoop {
    validator: ComplianceValidator,
    engine: Option<Arc<InferenceEngine>>,
    iteration_cap: u32,
}

impl RepairLoop {
    /// A repair loop with the default iteration cap and no engine fallback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validator: ComplianceValidator::new(),
            engine: None,
            iteration_cap: 3,
        }
    }

    /// Attach the inference engine used when an edit cannot be applied.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<InferenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Override the iteration cap.
    #[must_use]
    pub fn with_iteration_cap(mut self, cap: u32) -> Self {
        self.iteration_cap = cap.max(1);
        self
    }

    /// Run the loop. Deterministic for a given starting file map and
    /// ground truth: failures are repaired in report order and edits are
    /// pure text operations.
    pub async fn run(
        &self,
        files: FileMap,
        ground_truth: Option<&GroundTruth>,
        stack: &StackDescriptor,
    ) -> RepairOutcome {
        let mut current = files;
        let mut report = self.validator.validate(&current, ground_truth);
        let mut iterations = 0u32;
        let mut no_improvement = 0u32;

        loop {
            if report.is_complete() && report.failures.is_empty() {
                return RepairOutcome {
                    files: current,
                    report,
                    iterations,
                    reason: StopReason::Complete,
                };
            }
            if no_improvement >= PLATEAU_BOUND {
                info!(iterations, "repair loop plateaued");
                return RepairOutcome {
                    files: current,
                    report,
                    iterations,
                    reason: StopReason::Plateau,
                };
            }
            if iterations >= self.iteration_cap {
                info!(iterations, "repair loop hit the iteration cap");
                return RepairOutcome {
                    files: current,
                    report,
                    iterations,
                    reason: StopReason::IterationCap,
                };
            }

            iterations += 1;
            let mut candidate = current.clone();
            self.apply_repairs(&mut candidate, &report.failures, stack).await;
            let candidate_report = self.validator.validate(&candidate, ground_truth);

            if candidate_report.overall + IMPROVEMENT_EPSILON < report.overall {
                // Non-regression invariant: a repair may never reduce
                // overall compliance. Roll the iteration back.
                warn!(
                    before = report.overall,
                    after = candidate_report.overall,
                    "repair iteration regressed, rolling back"
                );
                no_improvement += 1;
            } else if candidate_report.overall > report.overall + IMPROVEMENT_EPSILON {
                debug!(
                    iteration = iterations,
                    before = report.overall,
                    after = candidate_report.overall,
                    "repair iteration improved compliance"
                );
                current = candidate;
                report = candidate_report;
                no_improvement = 0;
            } else {
                // Equal score: keep the additions (they may unblock the
                // next iteration) but count the stall.
                current = candidate;
                report = candidate_report;
                no_improvement += 1;
            }
        }
    }

    /// Convert failures to repair actions and apply them to `files`.
    async fn apply_repairs(
        &self,
        files: &mut FileMap,
        failures: &[ComplianceFailure],
        stack: &StackDescriptor,
    ) {
        for failure in failures {
            let applied = self.apply_one(files, failure);
            match applied {
                Ok(true) => {}
                Ok(false) => self.engine_fallback(files, failure, stack).await,
                Err(err) => {
                    warn!(locator = %failure.locator, error = %err, "repair edit errored");
                }
            }
        }
    }

    fn apply_one(
        &self,
        files: &mut FileMap,
        failure: &ComplianceFailure,
    ) -> devmatrix_core::Result<bool> {
        match failure.kind {
            FailureKind::MissingEntity => edits::add_entity(files, &failure.locator),
            FailureKind::MissingEndpoint => {
                let Some((method, path)) = parse_endpoint_locator(&failure.locator) else {
                    return Ok(false);
                };
                edits::add_endpoint(files, method, &path)
            }
            FailureKind::MissingValidation => {
                let Some((entity, attribute, kind)) = parse_validation_locator(&failure.locator)
                else {
                    return Ok(false);
                };
                edits::add_validation(files, &entity, &attribute, kind)
            }
            FailureKind::SerializationDefect => edits::fix_serialization(files),
            // An import failure has no targeted edit; only the engine can
            // recover it.
            FailureKind::ImportFailure => Ok(false),
        }
    }

    async fn engine_fallback(
        &self,
        files: &mut FileMap,
        failure: &ComplianceFailure,
        stack: &StackDescriptor,
    ) {
        let Some(engine) = self.engine.as_ref() else {
            debug!(locator = %failure.locator, "no engine fallback available, skipping repair");
            return;
        };

        let task = fallback_task(failure);
        match engine.synthesize(&task, stack).await {
            Ok(artifact) => {
                if let Err(err) = files.insert(&artifact.path, artifact.content) {
                    warn!(path = %artifact.path, error = %err, "fallback artifact rejected");
                }
            }
            Err(err) => {
                warn!(locator = %failure.locator, error = %err, "engine fallback failed");
            }
        }
    }
}

impl Default for RepairLoop {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_endpoint_locator(locator: &str) -> Option<(HttpMethod, String)> {
    let (method, path) = locator.split_once(' ')?;
    Some((method.parse().ok()?, path.to_string()))
}

fn parse_validation_locator(locator: &str) -> Option<(String, String, RuleKind)> {
    let (entity, rest) = locator.split_once('.')?;
    let (attribute, kind) = rest.split_once(':')?;
    let kind: RuleKind =
        serde_json::from_value(serde_json::Value::String(kind.to_string())).ok()?;
    Some((entity.to_string(), attribute.to_string(), kind))
}

fn fallback_task(failure: &ComplianceFailure) -> AtomicTask {
    let mut task = AtomicTask::new(
        format!("repair-{}", failure.locator.replace([' ', '/', '.', ':'], "-")),
        format!("repair artifact: {}", failure.detail),
        Domain::Crud,
    )
    .with_input("artifact", "source")
    .with_output("artifact", "source");
    task.constraints.push(failure.detail.clone());
    task.line_budget = MODULE_TASK_LINE_BUDGET;
    task
}

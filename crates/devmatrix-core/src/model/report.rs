//! The run report surfaced to callers.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// All phases completed
    Success,
    /// A fatal error terminated the run
    Failed,
    /// The cancellation token tripped
    Cancelled,
}

/// Timing and outcome of one pipeline phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCheckpoint {
    /// Phase name
    pub phase: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Whether the phase completed
    pub success: bool,
}

/// Details of the failure that terminated a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Phase that failed
    pub phase: String,
    /// Machine-readable error kind
    pub kind: ErrorKind,
    /// Rendered error message
    pub message: String,
}

/// Structured record of everything a run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run correlation id
    pub run_id: Uuid,
    /// Terminal status
    pub status: RunStatus,
    /// Per-phase checkpoints in execution order
    #[serde(default)]
    pub phases: Vec<PhaseCheckpoint>,
    /// Entity coverage fraction, if ground truth was supplied
    pub entity_coverage: Option<f64>,
    /// Endpoint coverage fraction
    pub endpoint_coverage: Option<f64>,
    /// Validation coverage fraction
    pub validation_coverage: Option<f64>,
    /// Final weighted compliance score
    pub overall_compliance: f64,
    /// Repair iterations executed
    pub repair_iterations: u32,
    /// Count of errors observed (fatal and recovered)
    pub errors: u32,
    /// Count of errors recovered from (retries that later succeeded,
    /// degraded stages)
    pub recoveries: u32,
    /// Tokens consumed across all completion calls
    pub tokens_consumed: u64,
    /// Patterns promoted by the learning phase
    pub promoted_patterns: u32,
    /// Present when status is `Failed`
    pub failure: Option<FailureInfo>,
    /// Run start time
    pub started_at: DateTime<Utc>,
    /// Run end time
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// A fresh in-progress report; `finished_at` is updated at completion.
    #[must_use]
    pub fn started(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            status: RunStatus::Failed,
            phases: Vec::new(),
            entity_coverage: None,
            endpoint_coverage: None,
            validation_coverage: None,
            overall_compliance: 0.0,
            repair_iterations: 0,
            errors: 0,
            recoveries: 0,
            tokens_consumed: 0,
            promoted_patterns: 0,
            failure: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Record a completed phase checkpoint.
    pub fn checkpoint(&mut self, phase: impl Into<String>, duration_ms: u64, success: bool) {
        self.phases.push(PhaseCheckpoint {
            phase: phase.into(),
            duration_ms,
            success,
        });
    }

    /// Mark the run failed with details.
    pub fn fail(&mut self, phase: impl Into<String>, kind: ErrorKind, message: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.errors += 1;
        self.failure = Some(FailureInfo {
            phase: phase.into(),
            kind,
            message: message.into(),
        });
        self.finished_at = Utc::now();
    }

    /// Mark the run cancelled.
    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
        self.finished_at = Utc::now();
    }

    /// Mark the run successful.
    pub fn succeed(&mut self) {
        self.status = RunStatus::Success;
        self.failure = None;
        self.finished_at = Utc::now();
    }
}

//! The per-run immutable context bundle.

use crate::model::compliance::GroundTruth;
use crate::model::spec::SpecDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Names the target stack for code emission. The core does not interpret
/// these beyond passing them to the implementation role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// HTTP framework identifier, e.g. `fastapi`
    pub http_framework: String,
    /// ORM identifier, e.g. `sqlalchemy`
    pub orm: String,
    /// Serialization library identifier, e.g. `pydantic`
    pub serialization: String,
}

impl StackDescriptor {
    /// Construct a descriptor.
    #[must_use]
    pub fn new(
        http_framework: impl Into<String>,
        orm: impl Into<String>,
        serialization: impl Into<String>,
    ) -> Self {
        Self {
            http_framework: http_framework.into(),
            orm: orm.into(),
            serialization: serialization.into(),
        }
    }

    /// The cache-key rendering, stable across runs.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}+{}+{}", self.http_framework, self.orm, self.serialization)
    }
}

impl Default for StackDescriptor {
    fn default() -> Self {
        Self::new("fastapi", "sqlalchemy", "pydantic")
    }
}

impl fmt::Display for StackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {}",
            self.http_framework, self.orm, self.serialization
        )
    }
}

/// Budget and limit knobs for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunBudgets {
    /// Token cap across all completion calls; `None` is unlimited
    pub max_tokens: Option<u64>,
    /// Per-LLM-call timeout in milliseconds
    pub llm_call_timeout_ms: u64,
    /// Per-phase timeout in milliseconds
    pub phase_timeout_ms: u64,
    /// Whole-run timeout in milliseconds
    pub run_timeout_ms: u64,
    /// Repair loop iteration cap
    pub repair_iteration_cap: u32,
    /// Parallelism within a topological layer
    pub max_concurrency: usize,
    /// Demanded validation coverage floor, if any
    pub min_validation_coverage: Option<f64>,
}

impl Default for RunBudgets {
    fn default() -> Self {
        Self {
            max_tokens: None,
            llm_call_timeout_ms: 60_000,
            phase_timeout_ms: 600_000,
            run_timeout_ms: 1_800_000,
            repair_iteration_cap: 3,
            max_concurrency: 4,
            min_validation_coverage: None,
        }
    }
}

/// Per-run immutable bundle shared read-only by all components.
///
/// Long-lived collaborators (completion model, embedding cache, pattern
/// store) are injected into the pipeline at construction rather than
/// carried here; this keeps the context serializable and trivially
/// shareable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    spec: SpecDocument,
    ground_truth: Option<GroundTruth>,
    stack: StackDescriptor,
    correlation_id: Uuid,
    budgets: RunBudgets,
}

impl RunContext {
    /// Create a context with default budgets and a fresh correlation id.
    #[must_use]
    pub fn new(spec: SpecDocument, stack: StackDescriptor) -> Self {
        Self {
            spec,
            ground_truth: None,
            stack,
            correlation_id: Uuid::new_v4(),
            budgets: RunBudgets::default(),
        }
    }

    /// Attach ground truth for coverage scoring.
    #[must_use]
    pub fn with_ground_truth(mut self, ground_truth: GroundTruth) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }

    /// Override the budgets.
    #[must_use]
    pub fn with_budgets(mut self, budgets: RunBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// The specification document.
    #[must_use]
    pub fn spec(&self) -> &SpecDocument {
        &self.spec
    }

    /// Ground truth, if supplied.
    #[must_use]
    pub fn ground_truth(&self) -> Option<&GroundTruth> {
        self.ground_truth.as_ref()
    }

    /// The target stack descriptor.
    #[must_use]
    pub fn stack(&self) -> &StackDescriptor {
        &self.stack
    }

    /// The run's correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// The run's budgets.
    #[must_use]
    pub fn budgets(&self) -> &RunBudgets {
        &self.budgets
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let budgets = RunBudgets::default();
        assert_eq!(budgets.llm_call_timeout_ms, 60_000);
        assert_eq!(budgets.phase_timeout_ms, 600_000);
        assert_eq!(budgets.run_timeout_ms, 1_800_000);
        assert_eq!(budgets.repair_iteration_cap, 3);
        assert_eq!(budgets.max_concurrency, 4);
    }

    #[test]
    fn stack_cache_key_is_stable() {
        let stack = StackDescriptor::default();
        assert_eq!(stack.cache_key(), "fastapi+sqlalchemy+pydantic");
    }

    #[test]
    fn contexts_get_distinct_correlation_ids() {
        let spec = SpecDocument::from_text("# S\nbody\n").unwrap();
        let a = RunContext::new(spec.clone(), StackDescriptor::default());
        let b = RunContext::new(spec, StackDescriptor::default());
        assert_ne!(a.correlation_id(), b.correlation_id());
    }
}

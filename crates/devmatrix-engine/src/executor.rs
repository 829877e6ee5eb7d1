//! Layer-parallel task execution.
//!
//! The pipeline is phase-sequential; within the synthesis phase, tasks in
//! the same topological layer are independent and run concurrently on a
//! cooperative pool bounded by `max_concurrency`. Layer barriers are
//! strict: layer `k+1` does not begin until every task of layer `k` has
//! terminated, successfully or with a recorded failure.

use crate::inference::{InferenceEngine, TaskArtifact};
use devmatrix_core::cancellation::CancellationToken;
use devmatrix_core::completion::TokenUsage;
use devmatrix_core::model::context::StackDescriptor;
use devmatrix_core::ErrorKind;
use devmatrix_planner::dag::TaskDag;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A task whose synthesis failed after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    /// Task id
    pub task_id: String,
    /// Error classification
    pub kind: ErrorKind,
    /// Rendered error
    pub message: String,
}

/// Outcome of the synthesis phase.
#[derive(Debug, Clone, Default)]
pub struct SynthesisReport {
    /// Artifacts for tasks that synthesized successfully
    pub artifacts: Vec<TaskArtifact>,
    /// Tasks marked `synthesis_failed` for the repair loop
    pub failed: Vec<FailedTask>,
    /// Tokens consumed across all synthesis calls
    pub usage: TokenUsage,
    /// Whether the run's cancellation token tripped mid-phase
    pub cancelled: bool,
}

/// Executes DAG layers against the inference engine.
pub struct LayerExecutor {
    engine: Arc<InferenceEngine>,
    max_concurrency: usize,
}

impl LayerExecutor {
    /// Create an executor with the given within-layer parallelism.
    #[must_use]
    pub fn new(engine: Arc<InferenceEngine>, max_concurrency: usize) -> Self {
        Self {
            engine,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Synthesize every task, layer by layer.
    ///
    /// Cancellation is cooperative: tasks already started complete their
    /// work, queued tasks in the layer do not start, and no later layer
    /// begins. The caller inspects `cancelled` on the report.
    pub async fn execute(
        &self,
        dag: &TaskDag,
        stack: &StackDescriptor,
        token: &CancellationToken,
    ) -> SynthesisReport {
        let mut report = SynthesisReport::default();

        for (layer_index, layer) in dag.layers().iter().enumerate() {
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }
            debug!(layer = layer_index + 1, tasks = layer.len(), "starting layer");

            let outcomes: Vec<Option<(String, devmatrix_core::Result<TaskArtifact>)>> =
                stream::iter(layer.iter().cloned())
                    .map(|task_id| {
                        let engine = Arc::clone(&self.engine);
                        let stack = stack.clone();
                        let token = token.clone();
                        let task = dag.task(&task_id).cloned();
                        async move {
                            // Started tasks run to completion; tasks not yet
                            // started are skipped once the token trips.
                            if token.is_cancelled() {
                                return None;
                            }
                            let task = task?;
                            Some((task_id, engine.synthesize(&task, &stack).await))
                        }
                    })
                    .buffer_unordered(self.max_concurrency)
                    .collect()
                    .await;

            for outcome in outcomes.into_iter().flatten() {
                let (task_id, result) = outcome;
                match result {
                    Ok(artifact) => {
                        report.usage.absorb(artifact.usage);
                        report.artifacts.push(artifact);
                    }
                    Err(err) => {
                        warn!(task = %task_id, error = %err, "task marked synthesis_failed");
                        report.failed.push(FailedTask {
                            task_id,
                            kind: err.kind(),
                            message: err.to_string(),
                        });
                    }
                }
            }

            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }
        }

        info!(
            synthesized = report.artifacts.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "synthesis phase complete"
        );
        report
    }
}

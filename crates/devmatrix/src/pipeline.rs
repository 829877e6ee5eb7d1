//! The cognitive pipeline orchestrator.
//!
//! Phases run strictly in sequence; each is bounded by the phase timeout
//! and the whole run by the run timeout. The cancellation token is checked
//! at every phase boundary, and mid-synthesis by the layer executor. A
//! cancelled run discards its partial file map.

use crate::learning;
use crate::persist;
use devmatrix_compliance::{ComplianceValidator, RepairLoop};
use devmatrix_core::cancellation::CancellationToken;
use devmatrix_core::completion::{CompletionModel, CompletionParams, TokenUsage};
use devmatrix_core::embeddings::{EmbeddingCache, Embeddings, HashEmbeddings};
use devmatrix_core::model::context::RunContext;
use devmatrix_core::model::file_map::FileMap;
use devmatrix_core::model::report::RunReport;
use devmatrix_core::retry::RetryPolicy;
use devmatrix_core::vector_store::GraphStore;
use devmatrix_core::{Error, ErrorKind, Result};
use devmatrix_engine::{InferenceEngine, LayerExecutor};
use devmatrix_patterns::PatternStore;
use devmatrix_planner::{Atomizer, MultiPassPlanner, TaskDag};
use devmatrix_spec::{RequirementsClassifier, SpecParser, ValidationExtractor};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything a run produces.
#[derive(Debug)]
pub struct RunOutput {
    /// The structured run report
    pub report: RunReport,
    /// The final file map; `None` on failed or cancelled runs
    pub files: Option<FileMap>,
}

/// Builder for [`CognitiveCore`].
pub struct CognitiveCoreBuilder {
    model: Arc<dyn CompletionModel>,
    embeddings: Option<Arc<dyn Embeddings>>,
    patterns: Option<Arc<PatternStore>>,
    graph_store: Option<Arc<dyn GraphStore>>,
    artifact_root: Option<PathBuf>,
    retry_policy: RetryPolicy,
}

impl CognitiveCoreBuilder {
    /// Substitute the embedding collaborator.
    #[must_use]
    pub fn with_embeddings(mut self, embeddings: Arc<dyn Embeddings>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Substitute the pattern store.
    #[must_use]
    pub fn with_patterns(mut self, patterns: Arc<PatternStore>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// Attach an optional graph store for layered-plan persistence.
    #[must_use]
    pub fn with_graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.graph_store = Some(store);
        self
    }

    /// Persist final file maps and reports under this directory.
    #[must_use]
    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = Some(root.into());
        self
    }

    /// Override the retry schedule for every LLM-facing component.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Assemble the core.
    #[must_use]
    pub fn build(self) -> CognitiveCore {
        let embeddings = self
            .embeddings
            .unwrap_or_else(|| Arc::new(EmbeddingCache::new(Arc::new(HashEmbeddings::default()))));
        let patterns = self.patterns.unwrap_or_else(|| Arc::new(PatternStore::in_memory()));
        let params = CompletionParams::deterministic(self.model.model_name());

        let extractor = ValidationExtractor::new(Arc::clone(&self.model), params.clone())
            .with_retry_policy(self.retry_policy);
        let planner = MultiPassPlanner::new(Arc::clone(&self.model), params.clone())
            .with_retry_policy(self.retry_policy);
        let engine = Arc::new(
            InferenceEngine::new(
                Arc::clone(&self.model),
                Arc::clone(&patterns),
                Atomizer::new(Arc::clone(&embeddings)),
                params,
            )
            .with_retry_policy(self.retry_policy),
        );

        CognitiveCore {
            embeddings,
            patterns,
            graph_store: self.graph_store,
            artifact_root: self.artifact_root,
            parser: SpecParser::new(),
            extractor,
            classifier: RequirementsClassifier::new(),
            planner,
            engine,
        }
    }
}

/// The end-to-end cognitive generation core.
///
/// Long-lived collaborators (completion model, embedding cache, pattern
/// store) are injected at construction; [`open`](Self::open) and
/// [`close`](Self::close) forward their lifecycle.
pub struct CognitiveCore {
    embeddings: Arc<dyn Embeddings>,
    patterns: Arc<PatternStore>,
    graph_store: Option<Arc<dyn GraphStore>>,
    artifact_root: Option<PathBuf>,
    parser: SpecParser,
    extractor: ValidationExtractor,
    classifier: RequirementsClassifier,
    planner: MultiPassPlanner,
    engine: Arc<InferenceEngine>,
}

impl CognitiveCore {
    /// Start building a core over a completion model.
    #[must_use]
    pub fn builder(model: Arc<dyn CompletionModel>) -> CognitiveCoreBuilder {
        CognitiveCoreBuilder {
            model,
            embeddings: None,
            patterns: None,
            graph_store: None,
            artifact_root: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Open long-lived collaborators.
    pub async fn open(&self) -> Result<()> {
        use devmatrix_core::Lifecycle;
        self.patterns.open().await
    }

    /// Flush and close long-lived collaborators.
    pub async fn close(&self) -> Result<()> {
        use devmatrix_core::Lifecycle;
        self.patterns.close().await
    }

    /// The pattern store (exposed for surrounding tools).
    #[must_use]
    pub fn patterns(&self) -> &Arc<PatternStore> {
        &self.patterns
    }

    /// Run the pipeline with a fresh cancellation token.
    pub async fn run(&self, ctx: RunContext) -> RunOutput {
        self.run_with_token(ctx, CancellationToken::new()).await
    }

    /// Run the pipeline under the caller's cancellation token.
    pub async fn run_with_token(&self, ctx: RunContext, token: CancellationToken) -> RunOutput {
        let budgets = ctx.budgets().clone();
        let phase_timeout = Duration::from_millis(budgets.phase_timeout_ms);
        let deadline = Instant::now() + Duration::from_millis(budgets.run_timeout_ms);
        let mut report = RunReport::started(ctx.correlation_id());
        let mut usage = TokenUsage::default();

        macro_rules! checked_phase {
            ($name:expr, $fut:expr) => {{
                if token.is_cancelled() {
                    report.cancel();
                    return RunOutput {
                        report,
                        files: None,
                    };
                }
                match phase(&mut report, $name, phase_timeout, deadline, $fut).await {
                    Ok(value) => value,
                    Err(err) => return finish_failed(report, $name, &err),
                }
            }};
        }

        macro_rules! check_tokens {
            ($name:expr) => {
                report.tokens_consumed = usage.total();
                if let Some(max) = budgets.max_tokens {
                    if usage.total() > max {
                        let err = Error::Budget(format!(
                            "token budget exhausted: {} > {max}",
                            usage.total()
                        ));
                        return finish_failed(report, $name, &err);
                    }
                }
            };
        }

        info!(run = %ctx.correlation_id(), "starting cognitive generation run");

        // Phase 1: spec ingestion and parsing. Parsing large documents is
        // CPU-bound, so it runs on a blocking worker instead of the
        // cooperative pool.
        let parsed = checked_phase!("spec_parse", {
            let parser = self.parser.clone();
            let spec = ctx.spec().clone();
            async move {
                tokio::task::spawn_blocking(move || parser.parse(&spec))
                    .await
                    .map_err(|e| Error::External(format!("parser worker failed: {e}")))?
            }
        });

        // Phase 2: validation extraction.
        let extraction = checked_phase!("validation_extraction", self.extractor.extract(&parsed, &ctx));
        usage.absorb(extraction.usage);
        check_tokens!("validation_extraction");

        // Phase 3: requirements classification.
        let classified = checked_phase!("classification", async {
            Ok(self.classifier.classify(&parsed.requirements))
        });

        // Phase 4: multi-pass planning.
        let mut planning_usage = TokenUsage::default();
        let plan = checked_phase!(
            "planning",
            self.planner
                .plan(&parsed, &classified.requirements, &mut planning_usage)
        );
        usage.absorb(planning_usage);
        check_tokens!("planning");

        // Phase 5: atomization (signature computation, warms the embedding
        // cache so synthesis lookups are deterministic and cheap).
        let atomizer = Atomizer::new(Arc::clone(&self.embeddings));
        let signatures = checked_phase!("atomization", atomizer.signatures(&plan.tasks));
        info!(tasks = signatures.len(), "atomization complete");

        // Phase 6: DAG materialization.
        let dag = checked_phase!("dag_build", async { TaskDag::build(plan.tasks.clone()) });
        if let Some(graph_store) = self.graph_store.as_deref() {
            dag.persist(graph_store, &ctx.correlation_id().to_string()).await;
        }

        // Phase 7: layer-parallel synthesis.
        let executor = LayerExecutor::new(Arc::clone(&self.engine), budgets.max_concurrency);
        let synthesis = checked_phase!("synthesis", async {
            Ok(executor.execute(&dag, ctx.stack(), &token).await)
        });
        usage.absorb(synthesis.usage);
        report.errors += synthesis.failed.len() as u32;
        check_tokens!("synthesis");
        if synthesis.cancelled {
            report.cancel();
            return RunOutput {
                report,
                files: None,
            };
        }

        let mut files = FileMap::new();
        for artifact in &synthesis.artifacts {
            if let Err(err) = files.insert(&artifact.path, artifact.content.clone()) {
                warn!(path = %artifact.path, error = %err, "artifact path rejected");
                report.errors += 1;
            }
        }

        // Extracted rules are registered in the artifact's validation
        // registry so the generated application enforces them.
        for rule in extraction.rules.iter() {
            if let Err(err) = devmatrix_compliance::edits::add_validation(
                &mut files,
                &rule.entity,
                &rule.attribute,
                rule.kind,
            ) {
                warn!(entity = %rule.entity, error = %err, "validation registration failed");
            }
        }

        // Phase 8: compliance validation.
        let validator = ComplianceValidator::new();
        let initial_report = checked_phase!("compliance", async {
            Ok(validator.validate(&files, ctx.ground_truth()))
        });

        // Phase 9: compliance-driven repair.
        let repair_loop = RepairLoop::new()
            .with_engine(Arc::clone(&self.engine))
            .with_iteration_cap(budgets.repair_iteration_cap);
        let repair = checked_phase!("repair", async {
            Ok(repair_loop
                .run(files, ctx.ground_truth(), ctx.stack())
                .await)
        });
        report.repair_iterations = repair.iterations;
        report.entity_coverage = repair.report.entity_coverage;
        report.endpoint_coverage = repair.report.endpoint_coverage;
        report.validation_coverage = repair.report.validation_coverage;
        report.overall_compliance = repair.report.overall;
        if initial_report.overall < repair.report.overall {
            report.recoveries += 1;
        }

        // Phase 10: learning promotion.
        let promoted = checked_phase!("learning", async {
            Ok(learning::promote_successful_artifacts(
                &self.patterns,
                &synthesis.artifacts,
                &repair.files,
                repair.report.overall,
            )
            .await)
        });
        report.promoted_patterns = promoted;

        report.tokens_consumed = usage.total();
        report.succeed();

        if let Some(root) = self.artifact_root.as_deref() {
            if let Err(err) = persist::persist_run(root, &repair.files, &report).await {
                warn!(error = %err, "run artifact persistence failed");
            }
        }

        info!(
            run = %report.run_id,
            compliance = report.overall_compliance,
            "run complete"
        );
        RunOutput {
            report,
            files: Some(repair.files),
        }
    }
}

/// Run one phase under its timeout and the run deadline, recording the
/// checkpoint either way.
async fn phase<T, F>(
    report: &mut RunReport,
    name: &str,
    phase_timeout: Duration,
    deadline: Instant,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let now = Instant::now();
    if now >= deadline {
        report.checkpoint(name, 0, false);
        return Err(Error::Budget(format!(
            "run timeout reached before phase {name}"
        )));
    }
    let allowed = phase_timeout.min(deadline - now);

    let start = Instant::now();
    let result = match tokio::time::timeout(allowed, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Budget(format!(
            "phase {name} exceeded its {}ms timeout",
            allowed.as_millis()
        ))),
    };
    report.checkpoint(name, start.elapsed().as_millis() as u64, result.is_ok());
    result
}

fn finish_failed(mut report: RunReport, name: &str, err: &Error) -> RunOutput {
    if matches!(err.kind(), ErrorKind::Cancelled) {
        report.cancel();
    } else {
        report.fail(name, err.kind(), err.to_string());
    }
    RunOutput {
        report,
        files: None,
    }
}

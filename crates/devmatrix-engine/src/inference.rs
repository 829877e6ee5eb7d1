//! The cognitive inference engine: co-reasoning synthesis.
//!
//! Strategy and implementation are distinct prompt contracts over the same
//! underlying completion service. Every call uses deterministic decoding;
//! a cache keyed by `(signature hash, stack descriptor)` is consulted
//! before any model work.

use dashmap::DashMap;
use devmatrix_core::completion::{CompletionModel, CompletionParams, TokenUsage};
use devmatrix_core::json::extract_first_json_object;
use devmatrix_core::model::context::StackDescriptor;
use devmatrix_core::model::file_map::normalize_path;
use devmatrix_core::model::signature::SemanticSignature;
use devmatrix_core::model::task::AtomicTask;
use devmatrix_core::retry::RetryPolicy;
use devmatrix_core::{Error, ErrorKind, Result};
use devmatrix_planner::atomizer::Atomizer;
use devmatrix_patterns::PatternStore;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;

/// A synthesized artifact for one atomic task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskArtifact {
    /// The task this artifact implements
    pub task_id: String,
    /// Relative path the artifact belongs at
    pub path: String,
    /// Source text
    pub content: String,
    /// The task's semantic signature
    pub signature: SemanticSignature,
    /// Hash of the pattern the strategy adapted, if any
    pub adapted_from: Option<String>,
    /// Tokens consumed synthesizing this artifact (zero on cache hits)
    pub usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct StrategyJson {
    approach: String,
    #[serde(default)]
    algorithm: String,
    #[serde(default)]
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImplementationJson {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RefinementJson {
    approved: bool,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Pattern-guided co-reasoning synthesis over a completion model.
pub struct InferenceEngine {
    model: Arc<dyn CompletionModel>,
    patterns: Arc<PatternStore>,
    atomizer: Atomizer,
    params: CompletionParams,
    policy: RetryPolicy,
    call_timeout: Duration,
    cache: DashMap<(String, String), TaskArtifact>,
}

impl InferenceEngine {
    /// Create an engine over its collaborators.
    #[must_use]
    pub fn new(
        model: Arc<dyn CompletionModel>,
        patterns: Arc<PatternStore>,
        atomizer: Atomizer,
        params: CompletionParams,
    ) -> Self {
        Self {
            model,
            patterns,
            atomizer,
            params,
            policy: RetryPolicy::exponential(MAX_ATTEMPTS),
            call_timeout: Duration::from_secs(60),
            cache: DashMap::new(),
        }
    }

    /// Override the retry schedule.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Number of cached artifacts.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Synthesize source text implementing `task` under `stack`.
    ///
    /// Steps: signature, pattern lookup, strategy, implementation,
    /// refinement. Failures after retries surface as errors; the caller
    /// records the task as `synthesis_failed` and the repair loop may later
    /// recover it.
    pub async fn synthesize(
        &self,
        task: &AtomicTask,
        stack: &StackDescriptor,
    ) -> Result<TaskArtifact> {
        let signature = self.atomizer.signature(task).await?;
        let cache_key = (signature.hash_hex(), stack.cache_key());
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(task = %task.id, "synthesis cache hit");
            let mut artifact = cached.clone();
            artifact.task_id = task.id.clone();
            artifact.usage = TokenUsage::default();
            return Ok(artifact);
        }

        let mut usage = TokenUsage::default();

        // Pattern store unavailability degrades to synthesis without
        // patterns.
        let similar = match self.patterns.find_similar(&signature, 0.85).await {
            Ok(similar) => similar,
            Err(err) => {
                warn!(error = %err, "pattern lookup failed, synthesizing without patterns");
                Vec::new()
            }
        };
        let top_pattern = similar.first();

        let strategy_prompt = match top_pattern {
            Some((pattern, score)) => adapt_strategy_prompt(task, &signature, pattern, *score),
            None => fresh_strategy_prompt(task, &signature),
        };
        let strategy: StrategyJson = self.call(&strategy_prompt, &mut usage).await?;
        debug!(task = %task.id, approach = %strategy.approach, "strategy settled");

        let implementation_prompt = implementation_prompt(task, stack, &strategy);
        let implementation: ImplementationJson =
            self.call(&implementation_prompt, &mut usage).await?;
        let path = normalize_path(&implementation.path)?;

        let refinement_prompt = refinement_prompt(task, &signature, &implementation.content);
        let refinement: RefinementJson = self.call(&refinement_prompt, &mut usage).await?;
        let content = match refinement.content.filter(|c| !c.trim().is_empty()) {
            Some(revised) if !refinement.approved => revised,
            _ => {
                if !refinement.approved {
                    debug!(
                        task = %task.id,
                        issues = ?refinement.issues,
                        "refinement flagged issues without a revision"
                    );
                }
                implementation.content
            }
        };

        let artifact = TaskArtifact {
            task_id: task.id.clone(),
            path,
            content,
            signature,
            adapted_from: top_pattern.map(|(p, _)| p.signature.hash_hex()),
            usage,
        };
        self.cache.insert(cache_key, artifact.clone());
        Ok(artifact)
    }

    /// One co-reasoning call: complete with timeout, parse a JSON object,
    /// retry with backoff and a reminder on parse failure.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        prompt: &str,
        usage: &mut TokenUsage,
    ) -> Result<T> {
        let mut current = prompt.to_string();
        let mut last_err = Error::External("synthesis call never ran".into());

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(self.policy.delay_for(attempt - 1)).await;
            }

            let completed =
                tokio::time::timeout(self.call_timeout, self.model.complete(&current, &self.params))
                    .await;
            let completion = match completed {
                Ok(Ok(completion)) => completion,
                Ok(Err(err)) if err.kind() == ErrorKind::Transient && attempt < MAX_ATTEMPTS => {
                    debug!(attempt, error = %err, "transient synthesis failure");
                    last_err = err;
                    continue;
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    let err = Error::Timeout {
                        operation: "synthesis completion".into(),
                        elapsed_ms: self.call_timeout.as_millis() as u64,
                    };
                    if attempt < MAX_ATTEMPTS {
                        last_err = err;
                        continue;
                    }
                    return Err(err);
                }
            };
            usage.absorb(completion.usage);

            match extract_first_json_object(&completion.text)
                .and_then(|v| serde_json::from_value::<T>(v).map_err(|e| {
                    Error::StructuredParse(format!("synthesis output shape mismatch: {e}"))
                })) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    debug!(attempt, error = %err, "synthesis parse failure, reminding");
                    last_err = err;
                    current = format!(
                        "{prompt}\n\nREMINDER: respond with ONLY the JSON object in the \
                         requested shape."
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err)
    }
}

fn task_block(task: &AtomicTask, signature: &SemanticSignature) -> String {
    format!(
        "TASK: {purpose}\nINPUTS: {inputs}\nOUTPUTS: {outputs}\nCONSTRAINTS: {constraints}\n\
         DOMAIN: {domain} | SECURITY: {security:?} | PERFORMANCE: {performance:?} | IDEMPOTENT: {idempotent}",
        purpose = signature.purpose,
        inputs = serde_json::to_string(&task.inputs).unwrap_or_default(),
        outputs = serde_json::to_string(&task.outputs).unwrap_or_default(),
        constraints = task.constraints.join("; "),
        domain = signature.domain,
        security = signature.security,
        performance = signature.performance,
        idempotent = signature.idempotent,
    )
}

fn adapt_strategy_prompt(
    task: &AtomicTask,
    signature: &SemanticSignature,
    pattern: &devmatrix_patterns::Pattern,
    score: f32,
) -> String {
    format!(
        r#"STRATEGY (adapt): a prior pattern matches this task at similarity {score:.3}.

{task_block}

PATTERN ARTIFACT:
{artifact}

Adapt the pattern to the task's exact inputs, outputs, and constraints.
Respond with ONLY a JSON object:
{{"approach": "adapt", "algorithm": "<one-paragraph sketch>", "steps": ["<named step>"]}}"#,
        task_block = task_block(task, signature),
        artifact = pattern.artifact,
    )
}

fn fresh_strategy_prompt(task: &AtomicTask, signature: &SemanticSignature) -> String {
    format!(
        r#"STRATEGY (from scratch): no prior pattern matches this task.

{task_block}

Design an implementation strategy.
Respond with ONLY a JSON object:
{{"approach": "from_scratch", "algorithm": "<one-paragraph sketch>", "steps": ["<named step>"]}}"#,
        task_block = task_block(task, signature),
    )
}

fn implementation_prompt(
    task: &AtomicTask,
    stack: &StackDescriptor,
    strategy: &StrategyJson,
) -> String {
    format!(
        r#"IMPLEMENTATION: realize the strategy as production code.

TARGET STACK: {stack}
LINE BUDGET: at most {line_budget} lines of code.

STRATEGY:
algorithm: {algorithm}
steps: {steps:?}

TASK PURPOSE: {purpose}

Respond with ONLY a JSON object:
{{"path": "<relative file path>", "content": "<the code>"}}"#,
        line_budget = task.line_budget,
        algorithm = strategy.algorithm,
        steps = strategy.steps,
        purpose = task.purpose,
    )
}

fn refinement_prompt(
    task: &AtomicTask,
    signature: &SemanticSignature,
    content: &str,
) -> String {
    format!(
        r#"REFINEMENT: check the implementation against the task signature.

{task_block}

IMPLEMENTATION:
{content}

Verify every declared output is produced and no undeclared input is
referenced. Respond with ONLY a JSON object:
{{"approved": true, "issues": [], "content": null}}
(or approved=false with issues and a corrected "content")"#,
        task_block = task_block(task, signature),
    )
}

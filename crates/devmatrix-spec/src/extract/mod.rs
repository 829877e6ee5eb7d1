//! Validation extraction: three stages, unioned and deduplicated.
//!
//! The stages form a closed family dispatched by [`StageId`]; composition is
//! union-then-dedup rather than inheritance. Deduplication
//! ([`dedup::dedupe`]) is the sole authority on which rule survives.

pub mod dedup;
pub mod direct;
pub mod llm;
pub mod pattern;

use crate::catalog::HeuristicCatalog;
use crate::parser::ParsedSpec;
use devmatrix_core::completion::{CompletionModel, CompletionParams, TokenUsage};
use devmatrix_core::model::compliance::RuleTriple;
use devmatrix_core::model::context::RunContext;
use devmatrix_core::model::validation::ValidationRuleSet;
use devmatrix_core::retry::RetryPolicy;
use devmatrix_core::{Error, Result};
use self::llm::LlmStage;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifier of one extraction stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageId {
    /// Explicit field constraints
    Direct,
    /// Heuristic catalog
    Pattern,
    /// LLM inference
    Llm,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [StageId; 3] = [StageId::Direct, StageId::Pattern, StageId::Llm];

    /// Stage name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Pattern => "pattern",
            Self::Llm => "llm",
        }
    }
}

/// Result of the extraction phase.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Deduplicated rule set
    pub rules: ValidationRuleSet,
    /// Fraction of ground-truth rules recovered; `None` without ground truth
    pub coverage: Option<f64>,
    /// Rules contributed per stage, pre-dedup, in [`StageId::ALL`] order
    pub stage_counts: [usize; 3],
    /// Tokens consumed by the LLM stage
    pub usage: TokenUsage,
}

/// The validation extractor: direct + pattern + LLM stages over a parsed
/// spec, unioned and deduplicated.
pub struct ValidationExtractor {
    catalog: HeuristicCatalog,
    llm: LlmStage,
}

impl ValidationExtractor {
    /// Create an extractor over a completion model with the built-in
    /// catalog and deterministic decoding.
    #[must_use]
    pub fn new(model: Arc<dyn CompletionModel>, params: CompletionParams) -> Self {
        Self {
            catalog: HeuristicCatalog::builtin(),
            llm: LlmStage::new(model, params),
        }
    }

    /// Override the LLM retry schedule.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.llm = self.llm.with_retry_policy(policy);
        self
    }

    /// Override the heuristic catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: HeuristicCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Run all stages and deduplicate.
    ///
    /// Fails only when nothing was extracted and the run context demanded a
    /// coverage floor; every stage-level failure degrades to an empty
    /// contribution.
    pub async fn extract(
        &self,
        parsed: &ParsedSpec,
        ctx: &RunContext,
    ) -> Result<ExtractionOutcome> {
        let mut usage = TokenUsage::default();
        let mut union = ValidationRuleSet::new();
        let mut stage_counts = [0usize; 3];

        for (i, stage) in StageId::ALL.iter().enumerate() {
            let contribution = match stage {
                StageId::Direct => direct::extract(parsed),
                StageId::Pattern => pattern::extract(&self.catalog, parsed),
                StageId::Llm => self.llm.extract(parsed, &mut usage).await,
            };
            stage_counts[i] = contribution.len();
            debug!(stage = stage.name(), rules = contribution.len(), "stage complete");
            union.extend(contribution);
        }

        let rules = dedup::dedupe(union);
        let coverage = ctx.ground_truth().map(|gt| coverage_against(&rules, &gt.validations));

        info!(
            unique_rules = rules.len(),
            coverage = coverage.unwrap_or(-1.0),
            "validation extraction complete"
        );

        if rules.is_empty() {
            if let Some(required) = ctx.budgets().min_validation_coverage {
                return Err(Error::MinimumCoverage {
                    achieved: 0.0,
                    required,
                });
            }
        }

        Ok(ExtractionOutcome {
            rules,
            coverage,
            stage_counts,
            usage,
        })
    }
}

/// Fraction of expected rule triples present in the extracted set.
#[must_use]
pub fn coverage_against(rules: &ValidationRuleSet, expected: &[RuleTriple]) -> f64 {
    if expected.is_empty() {
        return 1.0;
    }
    let present: HashSet<(String, String, devmatrix_core::model::validation::RuleKind)> =
        rules.iter().map(devmatrix_core::model::validation::ValidationRule::key).collect();
    let matched = expected
        .iter()
        .filter(|t| present.contains(&(t.entity.clone(), t.attribute.clone(), t.kind)))
        .count();
    matched as f64 / expected.len() as f64
}

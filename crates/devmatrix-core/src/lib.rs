//! # DevMatrix Core
//!
//! Shared foundation for the DevMatrix cognitive generation pipeline:
//!
//! - **Data model**: spec documents, entities, endpoints, requirements,
//!   validation rules, atomic tasks, semantic signatures, file maps, and
//!   run reports
//! - **Error taxonomy**: machine-readable kinds (transient, structured-parse,
//!   invariant, budget, compliance, external) with retry classification
//! - **Interfaces**: the `CompletionModel`, `Embeddings`, `VectorStore`, and
//!   `GraphStore` capabilities the pipeline consumes
//! - **Utilities**: exponential-backoff retry, LLM response cleaning,
//!   cancellation racing
//!
//! Downstream crates (`devmatrix-spec`, `devmatrix-planner`,
//! `devmatrix-patterns`, `devmatrix-engine`, `devmatrix-compliance`) build
//! the pipeline phases on top of these types.

pub mod cancellation;
pub mod completion;
pub mod embeddings;
pub mod error;
pub mod json;
pub mod model;
pub mod retry;
pub mod vector_store;

pub use cancellation::{or_cancelled, CancellationToken};
pub use completion::{Completion, CompletionModel, CompletionParams, TokenUsage};
pub use embeddings::{cosine_similarity, EmbeddingCache, Embeddings, HashEmbeddings};
pub use error::{Error, ErrorKind, Result};
pub use model::compliance::{
    ComplianceFailure, ComplianceReport, FailureKind, GroundTruth, RuleTriple,
};
pub use model::context::{RunBudgets, RunContext, StackDescriptor};
pub use model::endpoint::{Endpoint, HttpMethod};
pub use model::entity::{Entity, FieldConstraints, FieldDef, FieldType};
pub use model::file_map::{FileContents, FileMap};
pub use model::report::{FailureInfo, PhaseCheckpoint, RunReport, RunStatus};
pub use model::requirement::{Domain, Requirement, RequirementKind};
pub use model::signature::SemanticSignature;
pub use model::spec::{SpecDocument, SpecSection, SPEC_SIZE_LIMIT};
pub use model::task::{AtomicTask, PerformanceTier, SecurityTier};
pub use model::validation::{
    Provenance, RuleKind, RuleSource, ValidationRule, ValidationRuleSet,
};
pub use retry::{with_retry, RetryPolicy};
pub use vector_store::{GraphStore, InMemoryVectorStore, VectorHit, VectorStore};

use async_trait::async_trait;

/// Lifecycle hooks for long-lived collaborators (pattern store, embedding
/// cache). Modeled as explicit collaborators rather than ambient singletons
/// so tests can substitute in-memory doubles.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Open the collaborator (load persisted state, warm caches).
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Close the collaborator (flush state to its backing store).
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

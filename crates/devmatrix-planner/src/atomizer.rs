//! Semantic signature computation for atomic tasks.
//!
//! The signature is the similarity-indexable projection of a task: a
//! normalized purpose phrase, canonical I/O maps, the surrounding tiers,
//! a dense embedding, and the stable 64-bit digest. Embeddings come from
//! the injected collaborator, so atomization is as deterministic as the
//! embedding implementation.

use devmatrix_core::embeddings::Embeddings;
use devmatrix_core::model::signature::SemanticSignature;
use devmatrix_core::model::task::AtomicTask;
use devmatrix_core::Result;
use std::sync::Arc;

/// Computes semantic signatures for atomic tasks.
pub struct Atomizer {
    embeddings: Arc<dyn Embeddings>,
}

impl Atomizer {
    /// Create an atomizer over an embedding collaborator.
    #[must_use]
    pub fn new(embeddings: Arc<dyn Embeddings>) -> Self {
        Self { embeddings }
    }

    /// Compute the signature of one task.
    pub async fn signature(&self, task: &AtomicTask) -> Result<SemanticSignature> {
        let normalized = normalize_purpose(&task.purpose);
        let mut signature = SemanticSignature::from_task(task, normalized, Vec::new());
        signature.embedding = self.embeddings.embed_one(&signature.embedding_text()).await?;
        Ok(signature)
    }

    /// Compute signatures for a batch of tasks, in order.
    pub async fn signatures(&self, tasks: &[AtomicTask]) -> Result<Vec<SemanticSignature>> {
        let mut signatures = Vec::with_capacity(tasks.len());
        let mut texts = Vec::with_capacity(tasks.len());
        for task in tasks {
            let normalized = normalize_purpose(&task.purpose);
            let signature = SemanticSignature::from_task(task, normalized, Vec::new());
            texts.push(signature.embedding_text());
            signatures.push(signature);
        }
        let vectors = self.embeddings.embed(&texts).await?;
        for (signature, vector) in signatures.iter_mut().zip(vectors) {
            signature.embedding = vector;
        }
        Ok(signatures)
    }
}

/// Normalize a purpose phrase: lowercase, strip punctuation, stem common
/// suffixes.
#[must_use]
pub fn normalize_purpose(purpose: &str) -> String {
    purpose
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(stem)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Light suffix stemmer, enough to fold `creates`/`creating`/`created`
/// together without a linguistics dependency.
fn stem(token: &str) -> String {
    let t = token;
    for suffix in ["ing", "ied", "ies", "ed", "es", "s"] {
        if let Some(stripped) = t.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped.to_string();
            }
        }
    }
    t.to_string()
}

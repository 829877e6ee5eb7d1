//! Semantic signatures: the similarity-indexable projection of a task.

use crate::embeddings::cosine_similarity;
use crate::model::requirement::Domain;
use crate::model::task::{AtomicTask, PerformanceTier, SecurityTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cosine threshold above which two signatures are considered similar.
pub const SIMILARITY_THRESHOLD: f32 = 0.85;

/// A canonicalized, embedding-backed projection of an [`AtomicTask`], used
/// for pattern lookup and synthesis caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSignature {
    /// Normalized verb-object purpose phrase
    pub purpose: String,
    /// Canonical input map
    pub inputs: BTreeMap<String, String>,
    /// Canonical output map
    pub outputs: BTreeMap<String, String>,
    /// Domain tag
    pub domain: Domain,
    /// Security tier
    pub security: SecurityTier,
    /// Performance tier
    pub performance: PerformanceTier,
    /// Idempotency flag
    pub idempotent: bool,
    /// Dense embedding over `purpose || inputs || outputs`
    pub embedding: Vec<f32>,
    /// Stable 64-bit digest of the canonical projection
    pub hash: u64,
}

impl SemanticSignature {
    /// Assemble a signature from a task and its precomputed embedding.
    ///
    /// The purpose is expected to be normalized already (the atomizer owns
    /// normalization); the hash is the task's semantic hash.
    #[must_use]
    pub fn from_task(task: &AtomicTask, normalized_purpose: String, embedding: Vec<f32>) -> Self {
        Self {
            purpose: normalized_purpose,
            inputs: task.inputs.clone(),
            outputs: task.outputs.clone(),
            domain: task.domain,
            security: task.security,
            performance: task.performance,
            idempotent: task.idempotent,
            embedding,
            hash: task.semantic_hash(),
        }
    }

    /// The text the embedding is computed over.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|(n, t)| format!("{n} {t}"))
            .collect();
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|(n, t)| format!("{n} {t}"))
            .collect();
        format!("{} {} {}", self.purpose, inputs.join(" "), outputs.join(" "))
    }

    /// Fixed-width hex rendering of the hash, used as a storage key.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        format!("{:016x}", self.hash)
    }

    /// Similarity: cosine of the embeddings at or above the threshold AND
    /// matching domain tags.
    #[must_use]
    pub fn is_similar(&self, other: &SemanticSignature) -> bool {
        self.domain == other.domain
            && cosine_similarity(&self.embedding, &other.embedding) >= SIMILARITY_THRESHOLD
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signature(domain: Domain, embedding: Vec<f32>) -> SemanticSignature {
        SemanticSignature {
            purpose: "create user".into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            domain,
            security: SecurityTier::Low,
            performance: PerformanceTier::Low,
            idempotent: false,
            embedding,
            hash: 1,
        }
    }

    #[test]
    fn identical_embeddings_are_similar() {
        let a = signature(Domain::Crud, vec![1.0, 0.0]);
        let b = signature(Domain::Crud, vec![1.0, 0.0]);
        assert!(a.is_similar(&b));
    }

    #[test]
    fn domain_mismatch_blocks_similarity() {
        let a = signature(Domain::Crud, vec![1.0, 0.0]);
        let b = signature(Domain::Payment, vec![1.0, 0.0]);
        assert!(!a.is_similar(&b));
    }

    #[test]
    fn low_cosine_blocks_similarity() {
        let a = signature(Domain::Crud, vec![1.0, 0.0]);
        let b = signature(Domain::Crud, vec![0.0, 1.0]);
        assert!(!a.is_similar(&b));
    }
}

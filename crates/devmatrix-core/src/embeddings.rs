//! Embedding interface and the deterministic in-process implementation.
//!
//! Semantic signatures need dense vectors, but atomization must be
//! reproducible run-to-run. [`HashEmbeddings`] derives each dimension from a
//! digest of the input's tokens, so the same text always embeds to the same
//! vector without any network dependency. A process-wide [`EmbeddingCache`]
//! keeps repeated projections cheap.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Capability to embed texts into dense vectors.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        Ok(vectors.pop().unwrap_or_default())
    }

    /// Output dimensionality.
    fn dimension(&self) -> usize;
}

/// Cosine similarity between two vectors. Returns 0.0 when either is zero
/// or the lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Deterministic hash-based embeddings.
///
/// Tokens are lowercased words; each token contributes to a handful of
/// dimensions selected by its SHA-256 digest. Vectors are L2-normalized, so
/// cosine similarity reflects token overlap. Same text, same vector, every
/// process.
#[derive(Debug, Clone)]
pub struct HashEmbeddings {
    dimension: usize,
}

impl HashEmbeddings {
    /// Create hash embeddings with the given dimensionality.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            // Each token lights up four dimensions with signed weights.
            for chunk in digest.chunks_exact(8).take(4) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                let value = u64::from_le_bytes(raw);
                let index = (value % self.dimension as u64) as usize;
                let sign = if (value >> 63) == 0 { 1.0 } else { -1.0 };
                vector[index] += sign;
            }
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddings {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embeddings for HashEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Read-mostly process-wide cache in front of another `Embeddings`.
pub struct EmbeddingCache<E: Embeddings> {
    inner: Arc<E>,
    cache: RwLock<HashMap<String, Vec<f32>>>,
}

impl<E: Embeddings> EmbeddingCache<E> {
    /// Wrap `inner` with an unbounded in-memory cache.
    #[must_use]
    pub fn new(inner: Arc<E>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached projections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

#[async_trait]
impl<E: Embeddings> Embeddings for EmbeddingCache<E> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, String)> = Vec::new();

        {
            let cache = self.cache.read();
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(vector) => results[i] = Some(vector.clone()),
                    None => misses.push((i, text.clone())),
                }
            }
        }

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|(_, t)| t.clone()).collect();
            let fresh = self.inner.embed(&miss_texts).await?;
            let mut cache = self.cache.write();
            for ((i, text), vector) in misses.into_iter().zip(fresh.into_iter()) {
                cache.insert(text, vector.clone());
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_same_vector() {
        let emb = HashEmbeddings::new(64);
        let a = emb.embed_one("create user record").await.unwrap();
        let b = emb.embed_one("create user record").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_different_vector() {
        let emb = HashEmbeddings::new(64);
        let a = emb.embed_one("create user record").await.unwrap();
        let b = emb.embed_one("delete order line").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let emb = HashEmbeddings::new(128);
        let v = emb.embed_one("validate email format").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn overlapping_text_is_more_similar_than_disjoint() {
        let emb = HashEmbeddings::new(256);
        let base = emb.embed_one("create user with email").await.unwrap();
        let near = emb.embed_one("create user with name").await.unwrap();
        let far = emb.embed_one("compute invoice tax totals").await.unwrap();
        assert!(
            cosine_similarity(&base, &near) > cosine_similarity(&base, &far),
            "overlap should beat disjoint"
        );
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups() {
        let cache = EmbeddingCache::new(Arc::new(HashEmbeddings::new(32)));
        let first = cache.embed_one("purpose text").await.unwrap();
        assert_eq!(cache.len(), 1);
        let second = cache.embed_one("purpose text").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn cache_mixes_hits_and_misses_in_order() {
        let cache = EmbeddingCache::new(Arc::new(HashEmbeddings::new(32)));
        cache.embed_one("alpha").await.unwrap();
        let batch = cache
            .embed(&["alpha".into(), "beta".into(), "alpha".into()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], batch[2]);
        assert_eq!(cache.len(), 2);
    }
}

//! The pattern store: candidates, promotion, and similarity lookup.

use crate::persistence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use devmatrix_core::model::signature::SemanticSignature;
use devmatrix_core::vector_store::{InMemoryVectorStore, VectorStore};
use devmatrix_core::{Lifecycle, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tuning knobs for the store.
#[derive(Debug, Clone)]
pub struct PatternStoreConfig {
    /// Embedding dimensionality of stored signatures
    pub embedding_dimension: usize,
    /// Promoted patterns below this success rate are invisible to lookup
    pub min_success_rate: f64,
    /// Observed precision floor for candidate registration
    pub min_registration_precision: f64,
    /// Usage quorum for promotion
    pub promotion_quorum: u32,
    /// Maximum hits returned by `find_similar`
    pub max_results: usize,
    /// Persistence root; `None` keeps the store in memory
    pub root: Option<PathBuf>,
}

impl Default for PatternStoreConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 256,
            min_success_rate: 0.95,
            min_registration_precision: 0.95,
            promotion_quorum: 3,
            max_results: 5,
            root: None,
        }
    }
}

/// Observed metrics accompanying a registration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessMetrics {
    /// Validation precision of the artifact
    pub precision: f64,
    /// Success rate observed for this signature
    pub success_rate: f64,
}

/// A registered candidate awaiting promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCandidate {
    /// The signature the artifact was synthesized for
    pub signature: SemanticSignature,
    /// The generated artifact text
    pub artifact: String,
    /// Running mean success rate across registrations
    pub success_rate: f64,
    /// Best observed precision
    pub precision: f64,
    /// Number of registrations of this hash
    pub usage_count: u32,
    /// First registration time
    pub created_at: DateTime<Utc>,
}

/// A promoted, queryable pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// The signature the artifact was synthesized for
    pub signature: SemanticSignature,
    /// The reusable artifact text
    pub artifact: String,
    /// Success rate at promotion time
    pub success_rate: f64,
    /// Usage count at promotion time
    pub usage_count: u32,
    /// Promotion time
    pub promoted_at: DateTime<Utc>,
}

/// Cross-run store of synthesis patterns.
///
/// Writers are serialized per signature hash; reads observe every
/// promotion completed before them. The vector index only holds promoted
/// patterns, so lookup never sees unpromoted candidates.
pub struct PatternStore {
    config: PatternStoreConfig,
    index: InMemoryVectorStore,
    promoted: RwLock<HashMap<String, Pattern>>,
    candidates: RwLock<HashMap<String, PatternCandidate>>,
    hash_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PatternStore {
    /// Create a store with the given configuration.
    #[must_use]
    pub fn new(config: PatternStoreConfig) -> Self {
        let index = InMemoryVectorStore::new(config.embedding_dimension);
        Self {
            config,
            index,
            promoted: RwLock::new(HashMap::new()),
            candidates: RwLock::new(HashMap::new()),
            hash_locks: DashMap::new(),
        }
    }

    /// An in-memory store with default thresholds.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(PatternStoreConfig::default())
    }

    fn lock_for(&self, hash: &str) -> Arc<Mutex<()>> {
        self.hash_locks
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ranked similarity lookup over promoted patterns.
    ///
    /// Filters by the query's domain and by promoted success rate, returns
    /// at most `max_results` hits scoring at or above `threshold`.
    pub async fn find_similar(
        &self,
        signature: &SemanticSignature,
        threshold: f32,
    ) -> Result<Vec<(Pattern, f32)>> {
        let filter = HashMap::from([(
            "domain".to_string(),
            json!(signature.domain.tag()),
        )]);
        let hits = self
            .index
            .search(
                &signature.embedding,
                self.config.max_results * 4,
                Some(&filter),
            )
            .await?;

        let promoted = self.promoted.read();
        let mut results: Vec<(Pattern, f32)> = hits
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .filter_map(|hit| promoted.get(&hit.id).map(|p| (p.clone(), hit.score)))
            .filter(|(pattern, _)| pattern.success_rate >= self.config.min_success_rate)
            .collect();
        results.truncate(self.config.max_results);
        Ok(results)
    }

    /// Register a successful synthesis output as a candidate.
    ///
    /// Rejected (returns `false`) when observed precision is below the
    /// registration floor. Idempotent on the signature hash: repeated
    /// registrations fold into the usage count and running success rate
    /// instead of duplicating.
    pub async fn register_candidate(
        &self,
        signature: &SemanticSignature,
        artifact: &str,
        metrics: SuccessMetrics,
    ) -> Result<bool> {
        if metrics.precision < self.config.min_registration_precision {
            debug!(
                hash = %signature.hash_hex(),
                precision = metrics.precision,
                "candidate rejected below precision floor"
            );
            return Ok(false);
        }

        let hash = signature.hash_hex();
        let lock = self.lock_for(&hash);
        let _guard = lock.lock().await;

        let mut candidates = self.candidates.write();
        match candidates.get_mut(&hash) {
            Some(existing) => {
                let n = f64::from(existing.usage_count);
                existing.success_rate =
                    (existing.success_rate * n + metrics.success_rate) / (n + 1.0);
                existing.precision = existing.precision.max(metrics.precision);
                existing.usage_count += 1;
            }
            None => {
                candidates.insert(
                    hash.clone(),
                    PatternCandidate {
                        signature: signature.clone(),
                        artifact: artifact.to_string(),
                        success_rate: metrics.success_rate,
                        precision: metrics.precision,
                        usage_count: 1,
                        created_at: Utc::now(),
                    },
                );
            }
        }
        Ok(true)
    }

    /// Promote every candidate meeting the usage quorum and success-rate
    /// threshold. Returns the number promoted. Promotion is monotonic:
    /// nothing in the core ever demotes a pattern.
    pub async fn promote_candidates(&self) -> Result<u32> {
        let ready: Vec<PatternCandidate> = {
            let candidates = self.candidates.read();
            candidates
                .values()
                .filter(|c| {
                    c.usage_count >= self.config.promotion_quorum
                        && c.success_rate >= self.config.min_success_rate
                })
                .cloned()
                .collect()
        };

        let mut promoted_count = 0u32;
        for candidate in ready {
            let hash = candidate.signature.hash_hex();
            let lock = self.lock_for(&hash);
            let _guard = lock.lock().await;

            let pattern = Pattern {
                signature: candidate.signature.clone(),
                artifact: candidate.artifact.clone(),
                success_rate: candidate.success_rate,
                usage_count: candidate.usage_count,
                promoted_at: Utc::now(),
            };
            let payload = json!({
                "domain": pattern.signature.domain.tag(),
                "success_rate": pattern.success_rate,
            });
            self.index
                .upsert(&hash, pattern.signature.embedding.clone(), payload)
                .await?;
            self.promoted.write().insert(hash.clone(), pattern);
            self.candidates.write().remove(&hash);
            promoted_count += 1;
        }

        if promoted_count > 0 {
            info!(promoted = promoted_count, "candidates promoted to patterns");
        }
        Ok(promoted_count)
    }

    /// Fetch a promoted pattern by signature hash.
    #[must_use]
    pub fn promoted(&self, hash_hex: &str) -> Option<Pattern> {
        self.promoted.read().get(hash_hex).cloned()
    }

    /// Number of promoted patterns.
    #[must_use]
    pub fn promoted_count(&self) -> usize {
        self.promoted.read().len()
    }

    /// Number of unpromoted candidates.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.candidates.read().len()
    }

    /// Snapshot of a candidate's state.
    #[must_use]
    pub fn candidate(&self, hash_hex: &str) -> Option<PatternCandidate> {
        self.candidates.read().get(hash_hex).cloned()
    }
}

#[async_trait]
impl Lifecycle for PatternStore {
    async fn open(&self) -> Result<()> {
        let Some(root) = self.config.root.clone() else {
            return Ok(());
        };
        let loaded = persistence::load(&root).await?;
        for pattern in loaded.patterns {
            let hash = pattern.signature.hash_hex();
            let payload = json!({
                "domain": pattern.signature.domain.tag(),
                "success_rate": pattern.success_rate,
            });
            self.index
                .upsert(&hash, pattern.signature.embedding.clone(), payload)
                .await?;
            self.promoted.write().insert(hash, pattern);
        }
        for candidate in loaded.candidates {
            let hash = candidate.signature.hash_hex();
            self.candidates.write().insert(hash, candidate);
        }
        info!(
            patterns = self.promoted_count(),
            candidates = self.candidate_count(),
            "pattern store opened"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(root) = self.config.root.clone() else {
            return Ok(());
        };
        let patterns: Vec<Pattern> = self.promoted.read().values().cloned().collect();
        let candidates: Vec<PatternCandidate> =
            self.candidates.read().values().cloned().collect();
        persistence::save(&root, &patterns, &candidates).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use devmatrix_core::model::requirement::Domain;
    use devmatrix_core::model::task::{PerformanceTier, SecurityTier};
    use std::collections::BTreeMap;

    fn signature(domain: Domain, hot: usize) -> SemanticSignature {
        let mut embedding = vec![0.0f32; 256];
        embedding[hot] = 1.0;
        SemanticSignature {
            purpose: format!("purpose {hot}"),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            domain,
            security: SecurityTier::Low,
            performance: PerformanceTier::Low,
            idempotent: false,
            embedding,
            hash: hot as u64,
        }
    }

    fn good_metrics() -> SuccessMetrics {
        SuccessMetrics {
            precision: 0.98,
            success_rate: 0.97,
        }
    }

    async fn promoted_store(signature: &SemanticSignature) -> PatternStore {
        let store = PatternStore::in_memory();
        for _ in 0..3 {
            store
                .register_candidate(signature, "artifact text", good_metrics())
                .await
                .unwrap();
        }
        store.promote_candidates().await.unwrap();
        store
    }

    #[tokio::test]
    async fn low_precision_registration_is_rejected() {
        let store = PatternStore::in_memory();
        let accepted = store
            .register_candidate(
                &signature(Domain::Crud, 0),
                "artifact",
                SuccessMetrics {
                    precision: 0.9,
                    success_rate: 1.0,
                },
            )
            .await
            .unwrap();
        assert!(!accepted);
        assert_eq!(store.candidate_count(), 0);
    }

    #[tokio::test]
    async fn registration_is_idempotent_on_hash() {
        let store = PatternStore::in_memory();
        let sig = signature(Domain::Crud, 1);
        store
            .register_candidate(&sig, "artifact", good_metrics())
            .await
            .unwrap();
        store
            .register_candidate(&sig, "artifact", good_metrics())
            .await
            .unwrap();
        assert_eq!(store.candidate_count(), 1);
        assert_eq!(store.candidate(&sig.hash_hex()).unwrap().usage_count, 2);
    }

    #[tokio::test]
    async fn promotion_requires_quorum_and_success_rate() {
        let store = PatternStore::in_memory();
        let sig = signature(Domain::Crud, 2);

        store
            .register_candidate(&sig, "artifact", good_metrics())
            .await
            .unwrap();
        assert_eq!(store.promote_candidates().await.unwrap(), 0, "below quorum");

        store
            .register_candidate(&sig, "artifact", good_metrics())
            .await
            .unwrap();
        store
            .register_candidate(&sig, "artifact", good_metrics())
            .await
            .unwrap();
        assert_eq!(store.promote_candidates().await.unwrap(), 1);
        assert_eq!(store.promoted_count(), 1);
        assert_eq!(store.candidate_count(), 0);
    }

    #[tokio::test]
    async fn find_similar_matches_domain_and_threshold() {
        let sig = signature(Domain::Crud, 3);
        let store = promoted_store(&sig).await;

        let hits = store.find_similar(&sig, 0.85).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].1 > 0.99);

        // Same embedding, different domain: no hits.
        let other_domain = signature(Domain::Payment, 3);
        assert!(store
            .find_similar(&other_domain, 0.85)
            .await
            .unwrap()
            .is_empty());

        // Orthogonal embedding: below threshold.
        let orthogonal = signature(Domain::Crud, 200);
        assert!(store
            .find_similar(&orthogonal, 0.85)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn candidates_are_invisible_to_lookup() {
        let store = PatternStore::in_memory();
        let sig = signature(Domain::Crud, 4);
        store
            .register_candidate(&sig, "artifact", good_metrics())
            .await
            .unwrap();
        assert!(store.find_similar(&sig, 0.5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn promotion_is_monotonic_under_further_registrations() {
        let sig = signature(Domain::Crud, 5);
        let store = promoted_store(&sig).await;
        assert_eq!(store.promoted_count(), 1);

        // More registrations and promotions never demote.
        store
            .register_candidate(&sig, "artifact", good_metrics())
            .await
            .unwrap();
        store.promote_candidates().await.unwrap();
        assert!(store.promoted(&sig.hash_hex()).is_some());
        assert_eq!(store.promoted_count(), 1);
    }

    #[tokio::test]
    async fn open_close_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = PatternStoreConfig {
            root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let sig = signature(Domain::Crud, 6);
        {
            let store = PatternStore::new(config.clone());
            store.open().await.unwrap();
            for _ in 0..3 {
                store
                    .register_candidate(&sig, "persisted artifact", good_metrics())
                    .await
                    .unwrap();
            }
            store.promote_candidates().await.unwrap();
            store.close().await.unwrap();
        }

        let reopened = PatternStore::new(config);
        reopened.open().await.unwrap();
        assert_eq!(reopened.promoted_count(), 1);
        let hits = reopened.find_similar(&sig, 0.85).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.artifact, "persisted artifact");
    }
}

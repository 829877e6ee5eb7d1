//! Learning promotion: successful artifacts become pattern candidates.

use devmatrix_core::model::file_map::FileMap;
use devmatrix_engine::TaskArtifact;
use devmatrix_patterns::{PatternStore, SuccessMetrics};
use std::sync::Arc;
use tracing::{debug, warn};

/// Register a candidate for every task artifact that survived validation,
/// then promote. Returns the number of patterns promoted. No other visible
/// side effects.
pub async fn promote_successful_artifacts(
    patterns: &Arc<PatternStore>,
    artifacts: &[TaskArtifact],
    final_files: &FileMap,
    overall_compliance: f64,
) -> u32 {
    let metrics = SuccessMetrics {
        precision: overall_compliance,
        success_rate: overall_compliance,
    };

    for artifact in artifacts {
        // An artifact passed validation when the repair loop kept it in the
        // final tree.
        if !final_files.contains(&artifact.path) {
            debug!(task = %artifact.task_id, "artifact dropped before learning");
            continue;
        }
        if let Err(err) = patterns
            .register_candidate(&artifact.signature, &artifact.content, metrics)
            .await
        {
            warn!(task = %artifact.task_id, error = %err, "candidate registration failed");
        }
    }

    match patterns.promote_candidates().await {
        Ok(count) => count,
        Err(err) => {
            warn!(error = %err, "promotion failed");
            0
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use devmatrix_core::completion::TokenUsage;
    use devmatrix_core::model::requirement::Domain;
    use devmatrix_core::model::signature::SemanticSignature;
    use devmatrix_core::model::task::{PerformanceTier, SecurityTier};
    use std::collections::BTreeMap;

    fn artifact(path: &str, hot: usize) -> TaskArtifact {
        let mut embedding = vec![0.0f32; 256];
        embedding[hot] = 1.0;
        TaskArtifact {
            task_id: format!("t{hot}"),
            path: path.to_string(),
            content: "def f(): ...".into(),
            signature: SemanticSignature {
                purpose: format!("purpose {hot}"),
                inputs: BTreeMap::new(),
                outputs: BTreeMap::new(),
                domain: Domain::Crud,
                security: SecurityTier::Low,
                performance: PerformanceTier::Low,
                idempotent: false,
                embedding,
                hash: hot as u64,
            },
            adapted_from: None,
            usage: TokenUsage::default(),
        }
    }

    #[tokio::test]
    async fn surviving_artifacts_become_candidates() {
        let patterns = Arc::new(PatternStore::in_memory());
        let mut files = FileMap::new();
        files.insert("kept.py", "x").unwrap();

        let promoted = promote_successful_artifacts(
            &patterns,
            &[artifact("kept.py", 1), artifact("dropped.py", 2)],
            &files,
            0.99,
        )
        .await;

        assert_eq!(promoted, 0, "first run is below the promotion quorum");
        assert_eq!(patterns.candidate_count(), 1);
    }

    #[tokio::test]
    async fn quorum_across_runs_promotes() {
        let patterns = Arc::new(PatternStore::in_memory());
        let mut files = FileMap::new();
        files.insert("kept.py", "x").unwrap();
        let artifacts = vec![artifact("kept.py", 1)];

        for _ in 0..2 {
            let promoted =
                promote_successful_artifacts(&patterns, &artifacts, &files, 0.99).await;
            assert_eq!(promoted, 0);
        }
        let promoted = promote_successful_artifacts(&patterns, &artifacts, &files, 0.99).await;
        assert_eq!(promoted, 1);
        assert_eq!(patterns.promoted_count(), 1);
    }

    #[tokio::test]
    async fn low_compliance_registers_nothing() {
        let patterns = Arc::new(PatternStore::in_memory());
        let mut files = FileMap::new();
        files.insert("kept.py", "x").unwrap();

        promote_successful_artifacts(&patterns, &[artifact("kept.py", 1)], &files, 0.8).await;
        assert_eq!(patterns.candidate_count(), 0);
    }
}

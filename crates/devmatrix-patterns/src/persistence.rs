//! On-disk layout of the pattern store.
//!
//! ```text
//! <root>/<domain>/<hash>.artifact      promoted artifact text
//! <root>/<domain>/<hash>.json          promoted metadata
//! <root>/candidates/<domain>/<hash>.*  unpromoted candidates
//! ```

use crate::store::{Pattern, PatternCandidate};
use devmatrix_core::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Everything recovered from a store root.
#[derive(Debug, Default)]
pub struct LoadedState {
    /// Promoted patterns
    pub patterns: Vec<Pattern>,
    /// Unpromoted candidates
    pub candidates: Vec<PatternCandidate>,
}

fn domain_dir(root: &Path, domain: &str, candidate: bool) -> PathBuf {
    if candidate {
        root.join("candidates").join(domain)
    } else {
        root.join(domain)
    }
}

/// Write all patterns and candidates under `root`.
pub async fn save(root: &Path, patterns: &[Pattern], candidates: &[PatternCandidate]) -> Result<()> {
    for pattern in patterns {
        let dir = domain_dir(root, pattern.signature.domain.tag(), false);
        fs::create_dir_all(&dir).await?;
        let hash = pattern.signature.hash_hex();

        fs::write(dir.join(format!("{hash}.artifact")), &pattern.artifact).await?;
        let mut meta = pattern.clone();
        meta.artifact = String::new();
        fs::write(
            dir.join(format!("{hash}.json")),
            serde_json::to_vec_pretty(&meta)?,
        )
        .await?;
    }

    for candidate in candidates {
        let dir = domain_dir(root, candidate.signature.domain.tag(), true);
        fs::create_dir_all(&dir).await?;
        let hash = candidate.signature.hash_hex();

        fs::write(dir.join(format!("{hash}.artifact")), &candidate.artifact).await?;
        let mut meta = candidate.clone();
        meta.artifact = String::new();
        fs::write(
            dir.join(format!("{hash}.json")),
            serde_json::to_vec_pretty(&meta)?,
        )
        .await?;
    }

    Ok(())
}

/// Load everything under `root`. Unreadable entries are skipped with a
/// warning; a missing root is an empty store.
pub async fn load(root: &Path) -> Result<LoadedState> {
    let mut state = LoadedState::default();
    if !root.exists() {
        return Ok(state);
    }

    let mut top = fs::read_dir(root).await?;
    while let Some(entry) = top.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if entry.file_name() == "candidates" {
            let mut domains = fs::read_dir(entry.path()).await?;
            while let Some(domain) = domains.next_entry().await? {
                if domain.file_type().await?.is_dir() {
                    load_dir::<PatternCandidate>(&domain.path(), &mut state.candidates).await;
                }
            }
        } else {
            load_dir::<Pattern>(&entry.path(), &mut state.patterns).await;
        }
    }

    Ok(state)
}

trait HasArtifact: serde::de::DeserializeOwned {
    fn set_artifact(&mut self, artifact: String);
}

impl HasArtifact for Pattern {
    fn set_artifact(&mut self, artifact: String) {
        self.artifact = artifact;
    }
}

impl HasArtifact for PatternCandidate {
    fn set_artifact(&mut self, artifact: String) {
        self.artifact = artifact;
    }
}

async fn load_dir<T: HasArtifact>(dir: &Path, out: &mut Vec<T>) {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let loaded = async {
            let meta = fs::read(&path).await?;
            let mut value: T = serde_json::from_slice(&meta)?;
            let artifact_path = path.with_extension("artifact");
            let artifact = fs::read_to_string(&artifact_path).await?;
            value.set_artifact(artifact);
            devmatrix_core::Result::Ok(value)
        }
        .await;
        match loaded {
            Ok(value) => out.push(value),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable pattern"),
        }
    }
}

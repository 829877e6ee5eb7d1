//! Vector store and graph store interfaces, plus the in-memory store used
//! by default and in tests.
//!
//! The pipeline requires only eventual read-your-writes within a run, so the
//! brute-force cosine store below is sufficient for local operation; remote
//! implementations plug in behind the same trait.

use crate::embeddings::cosine_similarity;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    /// Stored id
    pub id: String,
    /// Similarity score (cosine, higher is closer)
    pub score: f32,
    /// Metadata payload stored at upsert time
    pub payload: JsonValue,
}

/// A vector index with payloads.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector stored under `id`.
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: JsonValue) -> Result<()>;

    /// Return the `top_k` closest entries, filtered by exact payload-field
    /// match when `filter` is provided.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&HashMap<String, JsonValue>>,
    ) -> Result<Vec<VectorHit>>;

    /// Fetch a single entry by id.
    async fn get(&self, id: &str) -> Result<Option<VectorHit>>;
}

/// Optional persistence of layered plans. Failures are non-fatal for the
/// pipeline; the DAG builder logs and continues.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Persist a layered plan under the run's correlation id.
    async fn persist_layers(&self, run_id: &str, layers: &[Vec<String>]) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVector {
    vector: Vec<f32>,
    payload: JsonValue,
}

#[derive(Serialize, Deserialize)]
struct SavedIndex {
    dimension: usize,
    entries: HashMap<String, StoredVector>,
}

/// Brute-force cosine similarity store.
///
/// Search cost is linear in the number of entries, which is fine at pattern
/// store scale (thousands). Writers take the write lock, so per-id writes
/// are serialized; readers proceed concurrently.
pub struct InMemoryVectorStore {
    dimension: usize,
    entries: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryVectorStore {
    /// Create an empty store for vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write the index to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let saved = SavedIndex {
            dimension: self.dimension,
            entries: self.entries.read().clone(),
        };
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), &saved)?;
        Ok(())
    }

    /// Load an index previously written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let saved: SavedIndex = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self {
            dimension: saved.dimension,
            entries: RwLock::new(saved.entries),
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::Invariant(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }
}

fn matches_filter(payload: &JsonValue, filter: &HashMap<String, JsonValue>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| payload.get(key) == Some(expected))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: JsonValue) -> Result<()> {
        self.check_dimension(&vector)?;
        self.entries
            .write()
            .insert(id.to_string(), StoredVector { vector, payload });
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&HashMap<String, JsonValue>>,
    ) -> Result<Vec<VectorHit>> {
        self.check_dimension(vector)?;
        let entries = self.entries.read();
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .filter(|(_, stored)| match filter {
                Some(f) => matches_filter(&stored.payload, f),
                None => true,
            })
            .map(|(id, stored)| VectorHit {
                id: id.clone(),
                score: cosine_similarity(vector, &stored.vector),
                payload: stored.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorHit>> {
        let entries = self.entries.read();
        Ok(entries.get(id).map(|stored| VectorHit {
            id: id.to_string(),
            score: 1.0,
            payload: stored.payload.clone(),
        }))
    }
}

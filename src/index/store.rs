//! In-memory vector index with flat-file persistence.
//!
//! Embeddings are stored little-endian f32 next to the chunk list; lookups
//! are brute-force cosine similarity. The loaded index is read-only and
//! safe to share across concurrent queries.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;
use crate::corpus::Chunk;

/// Metadata persisted alongside the vectors. The provider identifier is
/// checked before load; a mismatch means the index is stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub provider: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub corpus_fingerprint: String,
    pub built_at: DateTime<Utc>,
}

/// A chunk scored against a query, highest similarity first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug)]
pub struct VectorIndex {
    meta: IndexMeta,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Assemble an index from chunks and their embeddings, in insertion
    /// order. Vector count and dimensions must agree.
    pub fn build(
        provider: String,
        corpus_fingerprint: String,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, RagError> {
        if chunks.len() != vectors.len() {
            return Err(RagError::IndexBuild(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dimension) {
            return Err(RagError::IndexBuild(
                "embedding vectors have inconsistent dimensions".into(),
            ));
        }

        Ok(Self {
            meta: IndexMeta {
                provider,
                dimension,
                chunk_count: chunks.len(),
                corpus_fingerprint,
                built_at: Utc::now(),
            },
            chunks,
            vectors,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k chunks by cosine similarity, highest first. Ties keep chunk
    /// insertion order (stable sort), so results are deterministic for a
    /// fixed index and query vector.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .map(|(chunk, vector)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query, vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    /// Persist into `dir` (must exist): meta.json, chunks.json, vectors.bin.
    pub fn save(&self, dir: &Path) -> Result<(), RagError> {
        let meta = serde_json::to_string_pretty(&self.meta).map_err(RagError::index_build)?;
        fs::write(dir.join("meta.json"), meta).map_err(RagError::index_build)?;

        let chunks = serde_json::to_string(&self.chunks).map_err(RagError::index_build)?;
        fs::write(dir.join("chunks.json"), chunks).map_err(RagError::index_build)?;

        let mut blob = Vec::with_capacity(self.vectors.len() * self.meta.dimension * 4);
        for vector in &self.vectors {
            for value in vector {
                blob.extend_from_slice(&value.to_le_bytes());
            }
        }
        fs::write(dir.join("vectors.bin"), blob).map_err(RagError::index_build)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, RagError> {
        let meta = read_meta(dir)?;

        let chunks_raw = fs::read_to_string(dir.join("chunks.json"))
            .map_err(|e| RagError::IndexBuild(format!("chunks.json unreadable: {}", e)))?;
        let chunks: Vec<Chunk> =
            serde_json::from_str(&chunks_raw).map_err(RagError::index_build)?;

        let blob = fs::read(dir.join("vectors.bin"))
            .map_err(|e| RagError::IndexBuild(format!("vectors.bin unreadable: {}", e)))?;
        if meta.dimension == 0 && !blob.is_empty()
            || meta.dimension > 0 && blob.len() != chunks.len() * meta.dimension * 4
        {
            return Err(RagError::IndexBuild(format!(
                "vectors.bin size {} does not match {} chunks of dimension {}",
                blob.len(),
                chunks.len(),
                meta.dimension
            )));
        }

        let vectors: Vec<Vec<f32>> = blob
            .chunks_exact(meta.dimension.max(1) * 4)
            .map(|row| {
                row.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect()
            })
            .collect();

        if chunks.len() != vectors.len() {
            return Err(RagError::IndexBuild(
                "chunk and vector counts disagree on disk".into(),
            ));
        }

        Ok(Self {
            meta,
            chunks,
            vectors,
        })
    }
}

/// Read only the metadata, for staleness checks before a full load.
pub fn read_meta(dir: &Path) -> Result<IndexMeta, RagError> {
    let raw = fs::read_to_string(dir.join("meta.json"))
        .map_err(|e| RagError::IndexBuild(format!("meta.json unreadable: {}", e)))?;
    serde_json::from_str(&raw).map_err(RagError::index_build)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

//! Build-or-load cache for persisted vector indexes.
//!
//! Layout: `<root>/<dataset>/<provider-id>/{meta.json,chunks.json,vectors.bin}`.
//! An index is valid only for the embedding provider that produced it; the
//! provider identifier in meta.json is checked before any load. Rebuilds are
//! all-or-nothing: the new index is written to a temp directory and published
//! with a rename, under an exclusive per-dataset file lock so concurrent
//! builders cannot race.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;

use crate::core::errors::RagError;
use crate::corpus::{self, Chunker, Document};
use crate::llm::EmbeddingModel;

use super::store::{read_meta, VectorIndex};

const EMBED_BATCH_SIZE: usize = 64;

pub struct IndexCache {
    root: PathBuf,
    chunker: Chunker,
    verify_corpus_hash: bool,
}

impl IndexCache {
    pub fn new(root: impl Into<PathBuf>, chunker: Chunker, verify_corpus_hash: bool) -> Self {
        Self {
            root: root.into(),
            chunker,
            verify_corpus_hash,
        }
    }

    /// Load the persisted index for (dataset, provider) when fresh,
    /// otherwise chunk + embed the documents and rebuild.
    pub async fn build_or_load(
        &self,
        dataset: &str,
        embedder: Arc<dyn EmbeddingModel>,
        documents: &[Document],
    ) -> Result<VectorIndex, RagError> {
        let provider = embedder.id();
        let fingerprint = corpus::fingerprint(documents);
        let target = self.index_dir(dataset, &provider);

        if let Some(index) = self.try_load_fresh(&target, &provider, &fingerprint) {
            tracing::info!(dataset, %provider, "vector index cache hit");
            return Ok(index);
        }

        // Single-writer discipline: one build per dataset at a time.
        let lock = self.acquire_build_lock(dataset).await?;

        // Another builder may have published while we waited on the lock.
        if let Some(index) = self.try_load_fresh(&target, &provider, &fingerprint) {
            tracing::info!(dataset, %provider, "vector index published by concurrent build");
            drop(lock);
            return Ok(index);
        }

        tracing::info!(dataset, %provider, "vector index cache miss, rebuilding");
        let index = self
            .build(&provider, &fingerprint, documents, embedder.as_ref())
            .await?;
        self.publish(dataset, &target, &index)?;
        drop(lock);

        Ok(index)
    }

    /// Explicit invalidation: removes every persisted index for the dataset.
    pub fn invalidate(&self, dataset: &str) -> Result<(), RagError> {
        let dir = self.root.join(dataset);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(RagError::index_build)?;
            tracing::info!(dataset, "vector index invalidated");
        }
        Ok(())
    }

    fn index_dir(&self, dataset: &str, provider: &str) -> PathBuf {
        self.root.join(dataset).join(sanitize(provider))
    }

    fn try_load_fresh(
        &self,
        dir: &Path,
        provider: &str,
        fingerprint: &str,
    ) -> Option<VectorIndex> {
        if !dir.is_dir() {
            return None;
        }
        let meta = match read_meta(dir) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!("unreadable index metadata at {}: {}", dir.display(), err);
                return None;
            }
        };
        if meta.provider != provider {
            tracing::warn!(
                "index at {} was built by provider '{}', requested '{}'; rebuilding",
                dir.display(),
                meta.provider,
                provider
            );
            return None;
        }
        if self.verify_corpus_hash && meta.corpus_fingerprint != fingerprint {
            tracing::info!("corpus fingerprint changed for {}; rebuilding", dir.display());
            return None;
        }
        match VectorIndex::load(dir) {
            Ok(index) => Some(index),
            Err(err) => {
                tracing::warn!("failed to load index at {}: {}", dir.display(), err);
                None
            }
        }
    }

    async fn build(
        &self,
        provider: &str,
        fingerprint: &str,
        documents: &[Document],
        embedder: &dyn EmbeddingModel,
    ) -> Result<VectorIndex, RagError> {
        let chunks = self.chunker.split_all(documents);
        if chunks.is_empty() {
            return Err(RagError::IndexBuild("corpus produced no chunks".into()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let mut embedded = embedder.embed(batch).await?;
            vectors.append(&mut embedded);
        }

        VectorIndex::build(
            provider.to_string(),
            fingerprint.to_string(),
            chunks,
            vectors,
        )
    }

    /// Atomic publish: write into a temp sibling, then rename over the
    /// target. A failed build never leaves a partial index behind.
    fn publish(&self, dataset: &str, target: &Path, index: &VectorIndex) -> Result<(), RagError> {
        let dataset_dir = self.root.join(dataset);
        fs::create_dir_all(&dataset_dir).map_err(RagError::index_build)?;

        let tmp = dataset_dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&tmp).map_err(RagError::index_build)?;

        if let Err(err) = index.save(&tmp) {
            let _ = fs::remove_dir_all(&tmp);
            return Err(err);
        }

        if target.exists() {
            fs::remove_dir_all(target).map_err(RagError::index_build)?;
        }
        fs::rename(&tmp, target).map_err(|e| {
            let _ = fs::remove_dir_all(&tmp);
            RagError::IndexBuild(format!("failed to publish index: {}", e))
        })?;

        tracing::info!(
            dataset,
            chunks = index.len(),
            "vector index persisted to {}",
            target.display()
        );
        Ok(())
    }

    async fn acquire_build_lock(&self, dataset: &str) -> Result<fs::File, RagError> {
        let dataset_dir = self.root.join(dataset);
        fs::create_dir_all(&dataset_dir).map_err(RagError::index_build)?;
        let lock_path = dataset_dir.join(".build.lock");

        tokio::task::spawn_blocking(move || {
            let file = fs::File::create(&lock_path).map_err(RagError::index_build)?;
            file.lock_exclusive().map_err(RagError::index_build)?;
            Ok(file)
        })
        .await
        .map_err(RagError::index_build)?
    }
}

fn sanitize(provider: &str) -> String {
    provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

//! Offline ingestion: build (or refresh) the persisted vector index for the
//! configured corpus so first-query latency stays flat in serving processes.
//!
//! Usage: `ragdesk-ingest [--rebuild]`

use std::env;
use std::sync::Arc;

use anyhow::Context;

use ragdesk::core::config::{AppPaths, Settings};
use ragdesk::corpus::{self, Chunker};
use ragdesk::index::IndexCache;
use ragdesk::llm::embedding_model_from;
use ragdesk::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    logging::init(&paths);

    let rebuild = env::args().any(|arg| arg == "--rebuild");

    let settings = Settings::load(&paths.project_root).context("Failed to load configuration")?;
    settings.validate().context("Invalid configuration")?;

    let corpus_dir = paths.project_root.join(&settings.retrieval.corpus_dir);
    let documents = corpus::load_dir(&corpus_dir)
        .with_context(|| format!("Failed to load corpus from {}", corpus_dir.display()))?;
    tracing::info!(
        documents = documents.len(),
        corpus = %corpus_dir.display(),
        "corpus loaded"
    );

    let index_root = settings
        .retrieval
        .index_root
        .clone()
        .unwrap_or_else(|| paths.index_root());
    let cache = IndexCache::new(
        index_root,
        Chunker::new(settings.retrieval.chunk_size, settings.retrieval.chunk_overlap),
        settings.retrieval.verify_corpus_hash,
    );

    if rebuild {
        cache
            .invalidate(&settings.retrieval.dataset)
            .context("Failed to drop existing index")?;
        tracing::info!(dataset = %settings.retrieval.dataset, "existing index dropped");
    }

    let embedder = embedding_model_from(&settings.embedding);
    let index = cache
        .build_or_load(&settings.retrieval.dataset, Arc::clone(&embedder), &documents)
        .await
        .context("Index build failed")?;

    println!(
        "dataset={} provider={} chunks={} dimension={}",
        settings.retrieval.dataset,
        index.meta().provider,
        index.meta().chunk_count,
        index.meta().dimension
    );
    Ok(())
}

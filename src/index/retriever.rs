use std::sync::Arc;

use crate::core::errors::RagError;
use crate::llm::EmbeddingModel;

use super::store::{ScoredChunk, VectorIndex};

/// Similarity search over a loaded index. The index is shared read-only
/// across queries; a retriever never mutates it.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingModel>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn EmbeddingModel>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    /// Top-k chunks most similar to the query, highest similarity first.
    /// An embedder failure here is a per-query retrieval error, not an
    /// index-build one.
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredChunk>, RagError> {
        let embedded = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| RagError::Retrieval(e.to_string()))?;
        let query_vec = embedded
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Retrieval("embedder returned no query vector".into()))?;
        Ok(self.index.search(&query_vec, self.top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::corpus::Chunk;

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingModel for AxisEmbedder {
        fn id(&self) -> String {
            "test:axis".to_string()
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            // Project onto two fixed topics by keyword.
            Ok(inputs
                .iter()
                .map(|text| {
                    let orders = text.contains("order") as u8 as f32;
                    let tests = text.contains("test") as u8 as f32;
                    vec![orders, tests]
                })
                .collect())
        }
    }

    fn chunk(text: &str, seq: usize) -> Chunk {
        Chunk {
            doc_id: "faq.md".to_string(),
            seq,
            start: 0,
            text: text.to_string(),
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingModel for DownEmbedder {
        fn id(&self) -> String {
            "test:down".to_string()
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Err(RagError::IndexBuild("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn returns_most_similar_chunks_first() {
        let index = Arc::new(
            VectorIndex::build(
                "test:axis".to_string(),
                "fp".to_string(),
                vec![
                    chunk("how to read an ALT test result", 0),
                    chunk("your order ships within two days", 1),
                ],
                vec![vec![0.0, 1.0], vec![1.0, 0.0]],
            )
            .unwrap(),
        );

        let retriever = Retriever::new(index, Arc::new(AxisEmbedder), 1);
        let results = retriever.search("where is my order").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("order ships"));
    }

    #[tokio::test]
    async fn embed_failure_at_query_time_is_a_retrieval_error() {
        let index = Arc::new(
            VectorIndex::build(
                "test:down".to_string(),
                "fp".to_string(),
                vec![chunk("any", 0)],
                vec![vec![1.0]],
            )
            .unwrap(),
        );

        let retriever = Retriever::new(index, Arc::new(DownEmbedder), 1);
        let err = retriever.search("where is my order").await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
    }
}

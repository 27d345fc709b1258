use async_trait::async_trait;
use serde_json::Value;

use super::types::ChatRequest;
use crate::core::errors::RagError;

/// Language-model invocation capability. One implementation per provider,
/// selected at configuration time.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for logging (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    /// Plain chat completion; returns the model's text output verbatim.
    async fn chat(&self, request: ChatRequest) -> Result<String, RagError>;

    /// Chat completion constrained to the given JSON schema. Returns the
    /// raw text; the caller parses and owns the retry policy.
    async fn chat_structured(&self, request: ChatRequest, schema: &Value)
        -> Result<String, RagError>;
}

/// Embedding capability: text in, fixed-dimension vector out.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Stable provider identifier stored alongside persisted indexes,
    /// e.g. "openai:text-embedding-3-small". An index is valid only for
    /// the identifier that produced it.
    fn id(&self) -> String;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

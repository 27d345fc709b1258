//! Follow-up query rewriting against conversation history.

use std::sync::Arc;

use crate::core::errors::RagError;
use crate::history::{recent_turns, ConversationTurn};
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question \
which can be understood without the chat history. Do not answer the question; \
return only the reformulated question.";

/// Rewrites a dependent follow-up query into a standalone query using
/// prior turns. Passthrough when disabled or when there is no history.
#[derive(Clone)]
pub struct QueryContextualizer {
    model: Arc<dyn ChatModel>,
    enabled: bool,
    max_history_turns: usize,
}

impl QueryContextualizer {
    pub fn new(model: Arc<dyn ChatModel>, enabled: bool, max_history_turns: usize) -> Self {
        Self {
            model,
            enabled,
            max_history_turns,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the standalone query. The model output is passed through
    /// verbatim; a model failure propagates as a contextualization error
    /// and the orchestrator decides the raw-query fallback.
    pub async fn rewrite(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<String, RagError> {
        if !self.enabled || history.is_empty() {
            return Ok(query.to_string());
        }

        let mut messages = vec![ChatMessage::system(CONTEXTUALIZE_PROMPT)];
        messages.extend(recent_turns(history, self.max_history_turns));
        messages.push(ChatMessage::user(format!("Latest question: {}", query)));

        let rewritten = self
            .model
            .chat(ChatRequest::new(messages))
            .await
            .map_err(|e| RagError::Contextualization(e.to_string()))?;

        tracing::debug!(original = query, rewritten = %rewritten, "query contextualized");
        Ok(rewritten)
    }
}

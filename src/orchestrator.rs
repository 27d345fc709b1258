//! Query pipeline: contextualize, retrieve, fetch dynamic data, compose.
//!
//! Every stage upstream of composition degrades instead of aborting: the
//! query keeps moving with whatever evidence and account data survived, and
//! the result records what was lost. Only composition failures (after the
//! single schema retry) abort a query.

use std::sync::Arc;

use serde::Serialize;

use crate::compose::{AnswerComposer, ComposeInput};
use crate::contextualize::QueryContextualizer;
use crate::core::config::{AppPaths, Settings};
use crate::core::errors::RagError;
use crate::corpus::{self, Chunker};
use crate::history::{ConversationTurn, UserContext};
use crate::index::{IndexCache, Retriever, ScoredChunk};
use crate::llm::{chat_model_from, embedding_model_from};
use crate::mcp::{DashboardPayload, DynamicDataPool, McpServersConfig};
use crate::prompt::PromptStore;

/// Stages a query passes through, in order. `Failed` is terminal and only
/// reachable from composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryState {
    Received,
    Contextualized,
    Retrieved,
    DynamicFetched,
    Composed,
    Done,
    Failed,
}

/// What the pipeline had to give up on while answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Degradation {
    /// Contextualization failed; the raw query was used for retrieval.
    RawQueryFallback,
    /// Retrieval failed; the answer was composed without evidence.
    RetrievalUnavailable,
    /// No dynamic-data section could be fetched.
    DynamicDataUnavailable,
    /// Some but not all dynamic-data sections arrived.
    DynamicDataPartial,
}

#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub answer: String,
    pub followup_question: Option<String>,
    pub evidence: Vec<ScoredChunk>,
    pub degradations: Vec<Degradation>,
}

pub struct RagOrchestrator {
    contextualizer: QueryContextualizer,
    retriever: Retriever,
    composer: AnswerComposer,
    pool: Option<Arc<DynamicDataPool>>,
}

impl RagOrchestrator {
    pub fn new(
        contextualizer: QueryContextualizer,
        retriever: Retriever,
        composer: AnswerComposer,
        pool: Option<Arc<DynamicDataPool>>,
    ) -> Self {
        Self {
            contextualizer,
            retriever,
            composer,
            pool,
        }
    }

    /// Wires the whole engine from configuration: loads the corpus, builds
    /// or loads the vector index, and connects providers and the dynamic-data
    /// registry. An index that cannot be built or loaded is fatal here.
    pub async fn initialize(settings: &Settings, paths: &AppPaths) -> Result<Self, RagError> {
        settings.validate()?;

        let embedder = embedding_model_from(&settings.embedding);
        let chat = chat_model_from(&settings.chat);

        let corpus_dir = paths.project_root.join(&settings.retrieval.corpus_dir);
        let documents = corpus::load_dir(&corpus_dir)?;

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
        let index = cache
            .build_or_load(&settings.retrieval.dataset, Arc::clone(&embedder), &documents)
            .await?;

        let mut prompts = PromptStore::new(paths.project_root.join(&settings.prompt.dir));
        let system_prompt = prompts.load(&settings.prompt.system_prompt)?.to_string();

        let pool = if settings.dynamic_data.enabled {
            let registry_path = paths.project_root.join(&settings.dynamic_data.config_path);
            let registry = McpServersConfig::load(&registry_path)?;
            Some(Arc::new(DynamicDataPool::with_rmcp(registry)))
        } else {
            None
        };

        let contextualizer = QueryContextualizer::new(
            Arc::clone(&chat),
            settings.contextualize.enabled,
            settings.contextualize.max_history_turns,
        );
        tracing::info!(
            chat = chat.name(),
            embedding = %embedder.id(),
            contextualize = contextualizer.enabled(),
            dynamic_data = settings.dynamic_data.enabled,
            "engine configured"
        );

        Ok(Self::new(
            contextualizer,
            Retriever::new(Arc::new(index), embedder, settings.retrieval.top_k),
            AnswerComposer::new(
                chat,
                system_prompt,
                settings.chat.temperature,
                settings.chat.top_p,
                settings.contextualize.max_history_turns,
            ),
            pool,
        ))
    }

    pub async fn answer(
        &self,
        context_id: &str,
        query: &str,
        history: &[ConversationTurn],
        user: Option<&UserContext>,
    ) -> Result<AnswerResult, RagError> {
        let mut degradations = Vec::new();
        tracing::debug!(context = %context_id, state = ?QueryState::Received, "query accepted");

        let effective_query = match self.contextualizer.rewrite(query, history).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
            Ok(_) => {
                tracing::warn!(context = %context_id, "empty rewrite, using raw query");
                degradations.push(Degradation::RawQueryFallback);
                query.to_string()
            }
            Err(err) => {
                tracing::warn!(context = %context_id, error = %err, "contextualization failed, using raw query");
                degradations.push(Degradation::RawQueryFallback);
                query.to_string()
            }
        };
        tracing::debug!(context = %context_id, state = ?QueryState::Contextualized, "query contextualized");

        let evidence = match self.retriever.search(&effective_query).await {
            Ok(evidence) => evidence,
            Err(err) => {
                tracing::warn!(context = %context_id, error = %err, "retrieval failed, composing without evidence");
                degradations.push(Degradation::RetrievalUnavailable);
                Vec::new()
            }
        };
        tracing::debug!(
            context = %context_id,
            state = ?QueryState::Retrieved,
            evidence_count = evidence.len(),
            "evidence retrieved"
        );

        let dynamic_data = self
            .fetch_dynamic_data(context_id, user, &mut degradations)
            .await;
        tracing::debug!(context = %context_id, state = ?QueryState::DynamicFetched, "dynamic data resolved");

        let payload = self
            .composer
            .compose(ComposeInput {
                query: &effective_query,
                evidence: &evidence,
                dynamic_data: dynamic_data.as_ref(),
                history,
                user,
            })
            .await
            .inspect_err(|err| {
                tracing::error!(context = %context_id, state = ?QueryState::Failed, error = %err, "composition failed");
            })?;
        tracing::debug!(context = %context_id, state = ?QueryState::Composed, "answer composed");

        tracing::info!(
            context = %context_id,
            state = ?QueryState::Done,
            degradations = ?degradations,
            "query answered"
        );
        Ok(AnswerResult {
            answer: payload.answer,
            followup_question: payload.followup_question,
            evidence,
            degradations,
        })
    }

    async fn fetch_dynamic_data(
        &self,
        context_id: &str,
        user: Option<&UserContext>,
        degradations: &mut Vec<Degradation>,
    ) -> Option<DashboardPayload> {
        let pool = self.pool.as_ref()?;
        let user = user?;

        let payload = pool
            .get_user_order_dashboard(context_id, &user.user_id)
            .await;
        if payload.is_empty() {
            degradations.push(Degradation::DynamicDataUnavailable);
            return None;
        }
        if payload.is_partial() {
            degradations.push(Degradation::DynamicDataPartial);
        }
        Some(payload)
    }

    /// Tears down the pooled dynamic-data connections of one session.
    pub async fn end_session(&self, context_id: &str) {
        if let Some(pool) = &self.pool {
            pool.close_context(context_id).await;
        }
    }

    /// Tears down all pooled dynamic-data connections. Call at shutdown.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close_all().await;
        }
    }
}

//! Final answer composition: assembles the grounded prompt and asks the chat
//! model for a structured `{answer, followupQuestion}` payload.

use std::sync::Arc;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::RagError;
use crate::history::{recent_turns, ConversationTurn, UserContext};
use crate::index::ScoredChunk;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::mcp::DashboardPayload;

/// Structured answer the chat model must produce.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnswerPayload {
    /// The grounded answer to the user's question.
    pub answer: String,
    /// One natural follow-up question the user might ask next, when the
    /// model can suggest one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_question: Option<String>,
}

pub struct ComposeInput<'a> {
    pub query: &'a str,
    pub evidence: &'a [ScoredChunk],
    pub dynamic_data: Option<&'a DashboardPayload>,
    pub history: &'a [ConversationTurn],
    pub user: Option<&'a UserContext>,
}

pub struct AnswerComposer {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    temperature: f64,
    top_p: f64,
    max_history_turns: usize,
}

const RETRY_INSTRUCTION: &str = "Your previous reply was not valid JSON for the required schema. \
Respond with ONLY a JSON object with a string key \"answer\" and an optional string key \
\"followupQuestion\", with no surrounding text.";

impl AnswerComposer {
    pub fn new(
        model: Arc<dyn ChatModel>,
        system_prompt: String,
        temperature: f64,
        top_p: f64,
        max_history_turns: usize,
    ) -> Self {
        Self {
            model,
            system_prompt,
            temperature,
            top_p,
            max_history_turns,
        }
    }

    /// One model call, and on a schema-parse failure exactly one stricter
    /// retry. A second failure or any transport failure is a composition
    /// error for this query.
    pub async fn compose(&self, input: ComposeInput<'_>) -> Result<AnswerPayload, RagError> {
        let schema = answer_schema();
        let request = self.build_request(&input, false);

        let raw = self.model.chat_structured(request, &schema).await?;
        match parse_payload(&raw) {
            Ok(payload) => Ok(payload),
            Err(first_err) => {
                tracing::warn!(error = %first_err, "structured answer failed schema parse, retrying once");
                let retry = self.build_request(&input, true);
                let raw = self.model.chat_structured(retry, &schema).await?;
                parse_payload(&raw).map_err(|err| {
                    RagError::Composition(format!("retry also failed schema parse: {}", err))
                })
            }
        }
    }

    fn build_request(&self, input: &ComposeInput<'_>, strict_retry: bool) -> ChatRequest {
        let mut system = self.system_prompt.clone();

        if let Some(block) = user_context_block(input.user, input.dynamic_data) {
            system.push_str("\n\n# User Context Information\n");
            system.push_str(&block);
        }

        if input.evidence.is_empty() {
            system.push_str(
                "\n\n# Knowledge Base\nNo relevant documents were found for this question. \
Say so when the question needs them.",
            );
        } else {
            system.push_str("\n\n# Knowledge Base\n");
            for (i, scored) in input.evidence.iter().enumerate() {
                system.push_str(&format!("[{}] {}\n", i + 1, scored.chunk.text.trim()));
            }
        }

        if strict_retry {
            system.push_str("\n\n");
            system.push_str(RETRY_INSTRUCTION);
        }

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(recent_turns(input.history, self.max_history_turns));
        messages.push(ChatMessage::user(input.query.to_string()));

        ChatRequest::new(messages).with_sampling(self.temperature, self.top_p)
    }
}

pub fn answer_schema() -> Value {
    serde_json::to_value(schema_for!(AnswerPayload)).unwrap_or(Value::Null)
}

fn user_context_block(
    user: Option<&UserContext>,
    dynamic_data: Option<&DashboardPayload>,
) -> Option<String> {
    let mut lines = Vec::new();

    if let Some(user) = user {
        match &user.display_name {
            Some(name) => lines.push(format!("User: {} (id: {})", name, user.user_id)),
            None => lines.push(format!("User id: {}", user.user_id)),
        }
        for (key, value) in &user.attributes {
            lines.push(format!("{}: {}", key, value));
        }
    }

    if let Some(data) = dynamic_data {
        if let Some(profile) = &data.profile {
            lines.push(format!("Profile: {}", compact_json(profile)));
        }
        if let Some(orders) = &data.orders {
            lines.push(format!("Orders: {}", compact_json(orders)));
        }
        if data.is_partial() {
            lines.push("Some account data could not be fetched right now.".to_string());
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn compact_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Accepts raw JSON or a markdown-fenced block around it.
fn parse_payload(raw: &str) -> Result<AnswerPayload, RagError> {
    let trimmed = strip_fences(raw);
    serde_json::from_str::<AnswerPayload>(trimmed)
        .map_err(|err| RagError::SchemaParse(format!("{}: {}", err, preview(trimmed))))
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn preview(text: &str) -> String {
    let mut short: String = text.chars().take(120).collect();
    if short.len() < text.len() {
        short.push_str("...");
    }
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
        calls: AtomicUsize,
        last_system: Mutex<Option<String>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            let mut list: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
            list.reverse();
            Self {
                replies: Mutex::new(list),
                calls: AtomicUsize::new(0),
                last_system: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, RagError> {
            self.chat_structured(request, &Value::Null).await
        }

        async fn chat_structured(
            &self,
            request: ChatRequest,
            _schema: &Value,
        ) -> Result<String, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_system.lock().unwrap() = request
                .messages
                .first()
                .map(|message| message.content.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| RagError::Composition("no scripted reply left".to_string()))
        }
    }

    fn composer(model: Arc<ScriptedModel>) -> AnswerComposer {
        AnswerComposer::new(model, "You are a support assistant.".to_string(), 0.2, 1.0, 6)
    }

    fn evidence(texts: &[&str]) -> Vec<ScoredChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| ScoredChunk {
                chunk: Chunk {
                    doc_id: "faq.md".to_string(),
                    seq: i,
                    start: 0,
                    text: text.to_string(),
                },
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    fn input<'a>(evidence: &'a [ScoredChunk]) -> ComposeInput<'a> {
        ComposeInput {
            query: "How do I return an item?",
            evidence,
            dynamic_data: None,
            history: &[],
            user: None,
        }
    }

    #[tokio::test]
    async fn parses_clean_payload_in_one_call() {
        let model = Arc::new(ScriptedModel::new(&[
            r#"{"answer": "Ship it back within 30 days.", "followupQuestion": "Do you need a return label?"}"#,
        ]));
        let chunks = evidence(&["Returns are accepted within 30 days."]);
        let payload = composer(Arc::clone(&model))
            .compose(input(&chunks))
            .await
            .unwrap();
        assert_eq!(payload.answer, "Ship it back within 30 days.");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let system = model.last_system.lock().unwrap().clone().unwrap();
        assert!(system.contains("[1] Returns are accepted within 30 days."));
    }

    #[tokio::test]
    async fn fenced_payload_is_accepted() {
        let raw = "```json\n{\"answer\": \"a\", \"followupQuestion\": \"b\"}\n```";
        let payload = parse_payload(raw).unwrap();
        assert_eq!(payload.followup_question.as_deref(), Some("b"));

        let bare = parse_payload(r#"{"answer": "a"}"#).unwrap();
        assert!(bare.followup_question.is_none());
    }

    #[tokio::test]
    async fn malformed_reply_gets_exactly_one_retry() {
        let model = Arc::new(ScriptedModel::new(&[
            "Sure! Here's your answer: returns take 30 days.",
            r#"{"answer": "30 days.", "followupQuestion": "Anything else?"}"#,
        ]));
        let chunks = evidence(&["Returns are accepted within 30 days."]);
        let payload = composer(Arc::clone(&model))
            .compose(input(&chunks))
            .await
            .unwrap();
        assert_eq!(payload.answer, "30 days.");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);

        let retry_system = model.last_system.lock().unwrap().clone().unwrap();
        assert!(retry_system.contains("ONLY a JSON object"));
    }

    #[tokio::test]
    async fn second_malformed_reply_is_a_composition_error() {
        let model = Arc::new(ScriptedModel::new(&["not json", "still not json"]));
        let chunks = evidence(&["doc"]);
        let err = composer(Arc::clone(&model))
            .compose(input(&chunks))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Composition(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn user_context_block_carries_dashboard_sections() {
        let model = Arc::new(ScriptedModel::new(&[
            r#"{"answer": "a", "followupQuestion": "b"}"#,
        ]));
        let data = DashboardPayload {
            profile: Some(json!({"tier": "gold"})),
            orders: None,
        };
        let user = UserContext {
            user_id: "u-42".to_string(),
            display_name: Some("Mika".to_string()),
            attributes: serde_json::Map::new(),
        };
        let chunks = evidence(&["doc"]);
        composer(Arc::clone(&model))
            .compose(ComposeInput {
                query: "Where is my order?",
                evidence: &chunks,
                dynamic_data: Some(&data),
                history: &[],
                user: Some(&user),
            })
            .await
            .unwrap();

        let system = model.last_system.lock().unwrap().clone().unwrap();
        assert!(system.contains("# User Context Information"));
        assert!(system.contains("Mika"));
        assert!(system.contains("\"tier\":\"gold\""));
        assert!(system.contains("could not be fetched"));
    }

    #[test]
    fn schema_requires_the_answer_and_rejects_extra_keys() {
        let schema = answer_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("answer")));
        assert!(!required.contains(&json!("followupQuestion")));
        assert!(schema["properties"]["followupQuestion"].is_object());
        assert_eq!(schema["additionalProperties"], json!(false));
    }
}

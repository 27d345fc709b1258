use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{ChatModel, EmbeddingModel};
use super::types::ChatRequest;
use crate::core::errors::RagError;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama provider bound to one local model.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>, model: String) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: Client::new(),
        }
    }

    fn chat_body(&self, request: &ChatRequest) -> Value {
        let mut options = json!({});
        if let Some(obj) = options.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.top_p {
                obj.insert("top_p".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("num_predict".to_string(), json!(t));
            }
        }
        json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": options,
        })
    }

    async fn send_chat(&self, body: Value) -> Result<String, RagError> {
        let url = format!("{}/api/chat", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::composition)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Composition(format!(
                "Ollama chat error {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::composition)?;
        let content = payload["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(content)
    }
}

#[async_trait]
impl ChatModel for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, RagError> {
        let body = self.chat_body(&request);
        self.send_chat(body).await
    }

    async fn chat_structured(
        &self,
        request: ChatRequest,
        schema: &Value,
    ) -> Result<String, RagError> {
        let mut body = self.chat_body(&request);
        if let Some(obj) = body.as_object_mut() {
            // Ollama takes the JSON schema directly as the `format` field.
            obj.insert("format".to_string(), schema.clone());
        }
        self.send_chat(body).await
    }
}

#[async_trait]
impl EmbeddingModel for OllamaProvider {
    fn id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::index_build)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::IndexBuild(format!(
                "Ollama embed error {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::index_build)?;
        let mut embeddings = Vec::new();
        if let Some(data) = payload["embeddings"].as_array() {
            for item in data {
                if let Some(vals) = item.as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(RagError::IndexBuild(format!(
                "Ollama embed returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}

pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

use std::sync::Arc;

use crate::core::config::{ChatSettings, EmbeddingSettings, ProviderKind};

pub use provider::{ChatModel, EmbeddingModel};
pub use types::{ChatMessage, ChatRequest};

use ollama::OllamaProvider;
use openai::OpenAiProvider;

/// Build the configured chat provider. Selection happens once here, not
/// at call sites.
pub fn chat_model_from(settings: &ChatSettings) -> Arc<dyn ChatModel> {
    match settings.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            settings.base_url.clone(),
            settings.resolve_api_key(),
            settings.model.clone(),
        )),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(
            settings.base_url.clone(),
            settings.model.clone(),
        )),
    }
}

/// Build the configured embedding provider.
pub fn embedding_model_from(settings: &EmbeddingSettings) -> Arc<dyn EmbeddingModel> {
    match settings.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            settings.base_url.clone(),
            settings.resolve_api_key(),
            settings.model.clone(),
        )),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(
            settings.base_url.clone(),
            settings.model.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EmbeddingSettings;

    #[test]
    fn provider_identifier_includes_model() {
        let settings = EmbeddingSettings {
            provider: ProviderKind::OpenAi,
            model: "text-embedding-3-small".to_string(),
            base_url: None,
            api_key: Some("test".to_string()),
        };
        let model = embedding_model_from(&settings);
        assert_eq!(model.id(), "openai:text-embedding-3-small");

        let settings = EmbeddingSettings {
            provider: ProviderKind::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: None,
            api_key: None,
        };
        let model = embedding_model_from(&settings);
        assert_eq!(model.id(), "ollama:nomic-embed-text");
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// Which LLM backend serves a given capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_chat_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            model: default_chat_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    #[serde(default)]
    pub index_root: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Rebuild the index when the corpus content fingerprint changes.
    /// Off by default: staleness is provider-identifier-only.
    #[serde(default)]
    pub verify_corpus_hash: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            corpus_dir: default_corpus_dir(),
            index_root: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            verify_corpus_hash: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextualizeSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_window")]
    pub max_history_turns: usize,
}

impl Default for ContextualizeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history_turns: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicDataSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_mcp_config")]
    pub config_path: PathBuf,
}

impl Default for DynamicDataSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            config_path: default_mcp_config(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSettings {
    #[serde(default = "default_prompt_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            dir: default_prompt_dir(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Full configuration surface of the core, loaded from `config.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub contextualize: ContextualizeSettings,
    #[serde(default)]
    pub dynamic_data: DynamicDataSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
}

impl Settings {
    /// Load settings from the resolved config path, falling back to
    /// defaults when no config file exists.
    pub fn load(project_root: &Path) -> Result<Self, RagError> {
        let path = Self::config_path(project_root);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| RagError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RagError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn config_path(project_root: &Path) -> PathBuf {
        if let Ok(path) = env::var("RAGDESK_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        project_root.join("config.yml")
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".into()));
        }
        Ok(())
    }
}

impl EmbeddingSettings {
    /// API key from config, falling back to the provider's usual env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref(), self.provider)
    }
}

impl ChatSettings {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref(), self.provider)
    }
}

fn resolve_api_key(configured: Option<&str>, provider: ProviderKind) -> Option<String> {
    if let Some(key) = configured {
        if !key.trim().is_empty() {
            return Some(key.to_string());
        }
    }
    match provider {
        ProviderKind::OpenAi => env::var("OPENAI_API_KEY").ok(),
        ProviderKind::Ollama => None,
    }
}

fn default_embedding_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_chat_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_top_p() -> f64 {
    1.0
}

fn default_dataset() -> String {
    "knowledge_base".to_string()
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("rag_source")
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    400
}

fn default_top_k() -> usize {
    4
}

fn default_history_window() -> usize {
    6
}

fn default_true() -> bool {
    true
}

fn default_mcp_config() -> PathBuf {
    PathBuf::from("mcp_servers.json")
}

fn default_prompt_dir() -> PathBuf {
    PathBuf::from("prompt")
}

fn default_system_prompt() -> String {
    "assistant".to_string()
}

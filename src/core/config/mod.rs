pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    ChatSettings, ContextualizeSettings, DynamicDataSettings, EmbeddingSettings, PromptSettings,
    ProviderKind, RetrievalSettings, Settings,
};

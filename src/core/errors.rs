use thiserror::Error;

/// Typed failures of the retrieval-and-generation core.
///
/// The orchestrator maps each variant to a degrade-or-fail decision:
/// everything upstream of composition degrades the answer, only
/// `Composition` (and `IndexBuild` at startup) reaches the caller.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("index build failed: {0}")]
    IndexBuild(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("contextualization failed: {0}")]
    Contextualization(String),

    #[error("dynamic data fetch failed: {0}")]
    DynamicData(String),

    #[error("connection pool error: {0}")]
    ConnectionPool(String),

    #[error("schema parse failed: {0}")]
    SchemaParse(String),

    #[error("composition failed: {0}")]
    Composition(String),
}

impl RagError {
    pub fn config<E: std::fmt::Display>(err: E) -> Self {
        RagError::Config(err.to_string())
    }

    pub fn index_build<E: std::fmt::Display>(err: E) -> Self {
        RagError::IndexBuild(err.to_string())
    }

    pub fn composition<E: std::fmt::Display>(err: E) -> Self {
        RagError::Composition(err.to_string())
    }
}

//! Retrieval-augmented answer engine for support assistants.
//!
//! The crate wires a local document corpus, an embedding-backed vector
//! index, per-session dynamic-data servers, and a chat model into a single
//! query pipeline. See [`orchestrator::RagOrchestrator`] for the entry
//! point and [`orchestrator::Degradation`] for the fallback behavior of
//! each stage.

pub mod compose;
pub mod contextualize;
pub mod core;
pub mod corpus;
pub mod history;
pub mod index;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod orchestrator;
pub mod prompt;

pub use crate::core::config::{AppPaths, Settings};
pub use crate::core::errors::RagError;
pub use orchestrator::{AnswerResult, Degradation, QueryState, RagOrchestrator};

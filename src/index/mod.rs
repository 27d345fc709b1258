//! Vector index: persistence cache, in-memory store, and retrieval.

mod cache;
mod retriever;
mod store;

pub use cache::IndexCache;
pub use retriever::Retriever;
pub use store::{IndexMeta, ScoredChunk, VectorIndex};

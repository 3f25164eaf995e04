//! Long-term user memory and knowledge retrieval for Concierge.

pub mod embed;
pub mod error;
pub mod gateway;
pub mod model;
pub mod retrieval;
pub mod store;

/// Embedding interface, provider adapter and similarity helper.
pub use embed::{Embedder, LlmEmbedder, cosine_similarity};
/// Memory error type.
pub use error::MemoryError;
/// Persist/recall gateway used by the orchestrator and memory tools.
pub use gateway::{MemoryGateway, filter_by_score, prepare_memory_messages};
/// Memory record models.
pub use model::{MemoryMessage, MemoryRecord};
/// Relevance-filtered document search.
pub use retrieval::{RetrievalDocument, RetrievalGateway, filter_documents};
/// Memory store interface and implementations.
pub use store::{FileMemoryStore, InMemoryStore, MemoryStore};

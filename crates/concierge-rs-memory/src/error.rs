//! Error types for memory operations.

/// Errors returned by memory stores, embedders and gateways.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Embedding backend failed or returned a malformed batch.
    #[error("embedding failed: {0}")]
    Embedding(String),
    /// User id cannot be mapped onto the store.
    #[error("invalid user id: {0}")]
    InvalidUser(String),
}

//! Error types for the core orchestrator crate.

use crate::checkpoint::CheckpointError;
use concierge_rs_memory::MemoryError;
use concierge_rs_protocol::ThreadId;
use thiserror::Error;

/// Errors returned to callers of the orchestrator.
///
/// Tool failures never appear here; they are reported to the model as tool
/// results.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Thread id is unknown, or owned by another user.
    #[error("thread not found: {0}")]
    UnknownThread(ThreadId),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("model already registered: {0}")]
    DuplicateModel(String),
    /// Model provider failed after all retry attempts.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Memory or embedding backend failure.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    /// The stream consumer went away before the turn finished.
    #[error("turn cancelled")]
    Cancelled,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the failure came from an external backend.
    pub fn is_upstream(&self) -> bool {
        matches!(self, CoreError::Upstream(_) | CoreError::Memory(_))
    }
}

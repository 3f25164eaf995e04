//! Core conversation runtime for Concierge.
//!
//! This crate owns the orchestrator state machine (Agent, ToolDispatch,
//! MemoryPersist), history windowing, checkpointing of threads and the
//! filtered reply stream handed to callers.

pub mod checkpoint;
pub mod error;
pub mod filter;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod retry;
pub mod transition;
pub mod window;

pub use checkpoint::{
    CheckpointError, CheckpointStore, InMemoryCheckpointStore, JsonlCheckpointStore,
    ThreadSummary,
};
pub use error::CoreError;
pub use filter::EventStreamFilter;
pub use orchestrator::{LLMEntry, Orchestrator, ReplyStream, resolve_storage_root};
pub use prompt::{AGENT_PROMPT, PromptBuilder};
pub use retry::RetryPolicy;
pub use transition::Transition;
pub use window::{MessageCount, MessageWindow, SizeMetric};

/// Event sink interface re-exported for observers.
pub use concierge_rs_protocol::EventSink;

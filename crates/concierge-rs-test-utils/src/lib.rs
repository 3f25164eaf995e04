//! Test helpers shared across Concierge crates.

pub mod embed;
pub mod events;
pub mod llm;
pub mod memory;

pub use embed::KeywordEmbedder;
pub use events::{ClosedSink, CollectingSink};
pub use llm::{FailingLLM, FixedChatResponse, FlakyLLM, RecordedChat, ScriptedLLM, llm_tool_call};
pub use memory::FailingMemoryStore;

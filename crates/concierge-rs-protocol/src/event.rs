//! Low-level generation events emitted while a turn runs.

use crate::{ThreadId, TurnId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Node of the conversation graph that produced an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    /// Primary model call.
    Agent,
    /// Tool dispatch, including model calls made by tools.
    Tools,
    /// Terminal memory persistence.
    SaveMemories,
}

/// Envelope for every event emitted during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationEvent {
    /// Unique id for the event.
    pub id: Uuid,
    /// Turn the event belongs to.
    pub turn_id: TurnId,
    /// Thread the turn runs on.
    pub thread_id: ThreadId,
    /// Originating graph node.
    pub node: NodeId,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload.
    pub kind: EventKind,
}

impl GenerationEvent {
    pub fn new(turn_id: TurnId, thread_id: impl Into<ThreadId>, node: NodeId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            turn_id,
            thread_id: thread_id.into(),
            node,
            created_at: Utc::now(),
            kind,
        }
    }
}

/// All event kinds emitted during orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum EventKind {
    /// A graph node was entered.
    NodeStarted,
    /// The model produced a token chunk.
    ModelToken { content: TokenContent },
    /// A model call finished.
    ModelFinished { tool_calls: usize },
    /// Tool call execution started.
    ToolStarted {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    /// Tool call execution completed.
    ToolFinished {
        call_id: String,
        tool_name: String,
        success: bool,
    },
    /// Turn reached its terminal state.
    TurnCompleted { message: String },
    /// Turn failed.
    Error { message: String },
}

/// Payload of a model token event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TokenContent {
    /// Flat text chunk.
    Text(String),
    /// Structured list of content blocks.
    Blocks(Vec<ContentBlock>),
}

impl TokenContent {
    /// Plain text carried by the payload.
    ///
    /// Block lists concatenate their textual blocks and are trimmed.
    pub fn text(&self) -> String {
        match self {
            TokenContent::Text(text) => text.clone(),
            TokenContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<String>()
                .trim()
                .to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TokenContent::Text(text) => text.is_empty(),
            TokenContent::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// One block of structured model content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ContentBlock {
    /// Textual block.
    Text { text: String },
    /// Partial tool-use block streamed by some providers.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Any block kind this runtime does not interpret.
    #[serde(other)]
    Other,
}

/// Returned by a sink whose consumer has gone away.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("event sink closed")]
pub struct EventSinkClosed;

/// Sink interface for orchestrator and tool events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    ///
    /// Fails once the downstream consumer is gone so producers can stop early.
    async fn emit(&self, event: GenerationEvent) -> Result<(), EventSinkClosed>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn block_content_concatenates_text_blocks() {
        let content = TokenContent::Blocks(vec![
            ContentBlock::Text {
                text: " Hello".to_string(),
            },
            ContentBlock::ToolUse {
                id: "call_1".to_string(),
                name: "search_memory".to_string(),
                input: json!({}),
            },
            ContentBlock::Text {
                text: " world ".to_string(),
            },
        ]);
        assert_eq!(content.text(), "Hello world");
    }

    #[test]
    fn flat_content_is_not_trimmed() {
        let content = TokenContent::Text(" hi ".to_string());
        assert_eq!(content.text(), " hi ");
    }

    #[test]
    fn token_content_decodes_both_shapes() {
        let flat: TokenContent = serde_json::from_value(json!("abc")).expect("flat");
        assert_eq!(flat, TokenContent::Text("abc".to_string()));

        let blocks: TokenContent = serde_json::from_value(json!([
            { "type": "text", "text": "a" },
            { "type": "image", "url": "x" }
        ]))
        .expect("blocks");
        assert_eq!(
            blocks,
            TokenContent::Blocks(vec![
                ContentBlock::Text {
                    text: "a".to_string()
                },
                ContentBlock::Other
            ])
        );
    }

    #[test]
    fn event_kind_uses_tagged_layout() {
        let event = GenerationEvent::new(
            Uuid::nil(),
            "thread",
            NodeId::Agent,
            EventKind::ModelToken {
                content: TokenContent::Text("hi".to_string()),
            },
        );
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["node"], json!("agent"));
        assert_eq!(value["kind"]["type"], json!("model_token"));
        assert_eq!(value["kind"]["payload"]["content"], json!("hi"));
    }
}

//! Wire protocol types for Concierge conversations, events, and tool errors.

mod event;
mod tool;

pub use event::{
    ContentBlock, EventKind, EventSink, EventSinkClosed, GenerationEvent, NodeId, TokenContent,
};
pub use tool::ToolError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a persistent conversation.
pub type ThreadId = String;
/// Identifier of the end user owning memory records.
pub type UserId = String;
/// Unique identifier for one external invoke/stream call.
pub type TurnId = Uuid;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instruction injected by the runtime.
    System,
    /// Message authored by the end user.
    Human,
    /// Message produced by the model.
    Ai,
    /// Result of a tool invocation.
    Tool,
}

impl Role {
    /// Return the canonical string for the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Ai => "ai",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Role::System),
            "human" | "user" => Ok(Role::Human),
            "ai" | "assistant" => Ok(Role::Ai),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Model-issued request to execute a named tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back on the tool result.
    pub id: String,
    /// Tool name as registered.
    pub name: String,
    /// Argument mapping produced by the model.
    #[serde(default)]
    pub arguments: Value,
}

/// One entry of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Text content; empty for pure tool-call messages.
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by an `ai` message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Call id answered by a `tool` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name answered by a `tool` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Timestamp when the message was appended.
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Role::Ai, content)
    }

    /// Build an `ai` message carrying tool calls.
    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Ai, content)
        }
    }

    /// Build a `tool` message answering `call`.
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// True when the message requests at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Persisted state of one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    /// Thread the state belongs to.
    pub thread_id: ThreadId,
    /// User that started the thread.
    pub user_id: UserId,
    /// "Today" directive injected on the latest turn.
    #[serde(default)]
    pub today: String,
    /// Ordered conversation history.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Last time a turn completed on this thread.
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create an empty state for a new thread.
    pub fn new(thread_id: impl Into<ThreadId>, user_id: impl Into<UserId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            today: String::new(),
            messages: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Text of the most recent `ai` message, if any.
    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Ai)
            .map(|message| message.content.as_str())
    }
}

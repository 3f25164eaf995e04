//! Branching after the Agent node.

use concierge_rs_protocol::Message;

/// Where the state machine goes after a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The reply requested tools.
    ToolDispatch,
    /// The reply is final; persist the turn.
    MemoryPersist,
}

impl Transition {
    /// Decide from the last appended message.
    pub fn after(last: Option<&Message>) -> Self {
        match last {
            Some(message) if message.has_tool_calls() => Transition::ToolDispatch,
            _ => Transition::MemoryPersist,
        }
    }
}

//! Request and tool execution context.

use autoagents_llm::LLMProvider;
use concierge_rs_memory::{MemoryGateway, MemoryStore};
use concierge_rs_protocol::{
    EventKind, EventSink, EventSinkClosed, GenerationEvent, NodeId, ThreadId, ToolCall, TurnId,
    UserId,
};
use std::fmt;
use std::sync::Arc;

/// Per-request settings supplied by the caller of invoke/stream.
#[derive(Clone)]
pub struct RequestContext {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    /// Registered model id, `provider:model`.
    pub model: String,
    /// Store holding this user's long-term memory.
    pub memory: Arc<dyn MemoryStore>,
}

impl RequestContext {
    pub fn new(
        thread_id: impl Into<ThreadId>,
        user_id: impl Into<UserId>,
        model: impl Into<String>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            model: model.into(),
            memory,
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("thread_id", &self.thread_id)
            .field("user_id", &self.user_id)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Services shared by every tool call of a turn.
pub struct TurnServices {
    /// Model selected for the turn; form extraction runs on it.
    pub llm: Arc<dyn LLMProvider>,
    /// Thresholded access to the request's memory store.
    pub memory: MemoryGateway,
    /// Maximum records fetched per memory search.
    pub recall_limit: usize,
    /// Snapshot of the turn's "today" timestamp.
    pub today: String,
    /// Set for streaming turns.
    pub event_sink: Option<Arc<dyn EventSink>>,
}

/// Context handed to a tool for one invocation.
///
/// Cloning per call only bumps the reference count of the shared services.
#[derive(Clone)]
pub struct ToolContext {
    pub request: RequestContext,
    pub turn_id: TurnId,
    /// Provider call id of the invocation being served.
    pub tool_call_id: Option<String>,
    pub services: Arc<TurnServices>,
}

impl ToolContext {
    pub fn new(request: RequestContext, turn_id: TurnId, services: Arc<TurnServices>) -> Self {
        Self {
            request,
            turn_id,
            tool_call_id: None,
            services,
        }
    }

    /// Copy of this context bound to a specific call.
    pub fn for_call(&self, call: &ToolCall) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            ..self.clone()
        }
    }

    pub fn user_id(&self) -> &str {
        &self.request.user_id
    }

    pub fn memory(&self) -> &MemoryGateway {
        &self.services.memory
    }

    pub fn is_streaming(&self) -> bool {
        self.services.event_sink.is_some()
    }

    /// Emit an event on the turn's sink; a no-op for non-streaming turns.
    pub async fn emit(&self, node: NodeId, kind: EventKind) -> Result<(), EventSinkClosed> {
        let Some(sink) = self.services.event_sink.as_ref() else {
            return Ok(());
        };
        sink.emit(GenerationEvent::new(
            self.turn_id,
            self.request.thread_id.clone(),
            node,
            kind,
        ))
        .await
    }
}

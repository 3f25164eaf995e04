//! Selects the caller-visible reply tokens from a turn's event stream.

use concierge_rs_protocol::{EventKind, GenerationEvent, NodeId};
use futures_util::{Stream, StreamExt};

/// Passes only model tokens produced by one node.
///
/// The default node is the Agent, so tokens from model calls made inside
/// tools (form extraction) never reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStreamFilter {
    node: NodeId,
}

impl Default for EventStreamFilter {
    fn default() -> Self {
        Self::new(NodeId::Agent)
    }
}

impl EventStreamFilter {
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Text of `event` when it is a non-empty token from the selected node.
    pub fn accept(&self, event: &GenerationEvent) -> Option<String> {
        if event.node != self.node {
            return None;
        }
        let EventKind::ModelToken { content } = &event.kind else {
            return None;
        };
        let text = content.text();
        (!text.is_empty()).then_some(text)
    }

    /// Adapt an event stream into the stream of accepted texts.
    pub fn apply<S>(self, events: S) -> impl Stream<Item = String>
    where
        S: Stream<Item = GenerationEvent>,
    {
        events.filter_map(move |event| futures_util::future::ready(self.accept(&event)))
    }
}

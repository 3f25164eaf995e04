//! Reply stream handed to callers of a streamed turn.

use crate::error::CoreError;
use crate::filter::EventStreamFilter;
use async_trait::async_trait;
use concierge_rs_protocol::{EventSink, EventSinkClosed, GenerationEvent, ThreadId, TurnId};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

/// Item carried from the turn task to the reply stream.
#[derive(Debug)]
pub(crate) enum TurnItem {
    Event(GenerationEvent),
    Failed(CoreError),
}

/// Event sink feeding a reply stream, with an optional observer copy.
pub(crate) struct ChannelSink {
    sender: mpsc::Sender<TurnItem>,
    observer: Option<Arc<dyn EventSink>>,
}

impl ChannelSink {
    pub(crate) fn new(sender: mpsc::Sender<TurnItem>, observer: Option<Arc<dyn EventSink>>) -> Self {
        Self { sender, observer }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: GenerationEvent) -> Result<(), EventSinkClosed> {
        if let Some(observer) = &self.observer {
            let _ = observer.emit(event.clone()).await;
        }
        self.sender
            .send(TurnItem::Event(event))
            .await
            .map_err(|_| EventSinkClosed)
    }
}

const RUNNING: u8 = 0;
const COMMITTING: u8 = 1;
const CANCELLED: u8 = 2;

/// One-shot decision between committing a streamed turn and cancelling it.
///
/// Whichever side moves first wins: once committing, dropping the stream no
/// longer aborts the turn; once cancelled, the turn must not persist.
#[derive(Debug, Default)]
pub(crate) struct CommitGate(AtomicU8);

impl CommitGate {
    pub(crate) fn try_commit(&self) -> bool {
        self.transition(COMMITTING)
    }

    pub(crate) fn try_cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    fn transition(&self, to: u8) -> bool {
        self.0
            .compare_exchange(RUNNING, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Text deltas of the Agent node for one streamed turn.
///
/// The stream ends after the turn completes, or yields one error when it
/// fails. Dropping it before the turn commits aborts the turn: nothing is
/// checkpointed or persisted to memory.
pub struct ReplyStream {
    pub thread_id: ThreadId,
    pub turn_id: TurnId,
    events: ReceiverStream<TurnItem>,
    filter: EventStreamFilter,
    handle: JoinHandle<()>,
    gate: Arc<CommitGate>,
    finished: bool,
}

impl std::fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyStream")
            .field("thread_id", &self.thread_id)
            .field("turn_id", &self.turn_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ReplyStream {
    pub(crate) fn new(
        thread_id: ThreadId,
        turn_id: TurnId,
        receiver: mpsc::Receiver<TurnItem>,
        handle: JoinHandle<()>,
        gate: Arc<CommitGate>,
    ) -> Self {
        Self {
            thread_id,
            turn_id,
            events: ReceiverStream::new(receiver),
            filter: EventStreamFilter::default(),
            handle,
            gate,
            finished: false,
        }
    }

    /// Drain the stream and concatenate every delta.
    pub async fn collect_text(mut self) -> Result<String, CoreError> {
        let mut reply = String::new();
        while let Some(delta) = self.next().await {
            reply.push_str(&delta?);
        }
        Ok(reply)
    }
}

impl Stream for ReplyStream {
    type Item = Result<String, CoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut this.events).poll_next(cx) {
                Poll::Ready(Some(TurnItem::Event(event))) => {
                    if let Some(text) = this.filter.accept(&event) {
                        return Poll::Ready(Some(Ok(text)));
                    }
                }
                Poll::Ready(Some(TurnItem::Failed(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        if self.gate.try_cancel() {
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_rs_protocol::{EventKind, NodeId, TokenContent};
    use concierge_rs_test_utils::CollectingSink;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn token(node: NodeId, text: &str) -> GenerationEvent {
        GenerationEvent::new(
            Uuid::nil(),
            "thread-1",
            node,
            EventKind::ModelToken {
                content: TokenContent::Text(text.to_string()),
            },
        )
    }

    #[test]
    fn gate_decides_once() {
        let gate = CommitGate::default();
        assert!(gate.try_commit());
        assert!(!gate.try_cancel());

        let gate = CommitGate::default();
        assert!(gate.try_cancel());
        assert!(!gate.try_commit());
    }

    #[tokio::test]
    async fn reply_stream_yields_agent_text_then_error() {
        let (sender, receiver) = mpsc::channel(8);
        let observer = Arc::new(CollectingSink::default());
        let sink = ChannelSink::new(sender.clone(), Some(observer.clone()));
        let handle = tokio::spawn(async move {
            let _ = sink.emit(token(NodeId::Agent, "Hello ")).await;
            let _ = sink.emit(token(NodeId::Tools, "{\"date\"")).await;
            let _ = sink.emit(token(NodeId::Agent, "there")).await;
            let _ = sender.send(TurnItem::Failed(CoreError::Upstream("down".into()))).await;
        });
        let mut stream = ReplyStream::new(
            "thread-1".to_string(),
            Uuid::nil(),
            receiver,
            handle,
            Arc::new(CommitGate::default()),
        );
        assert_eq!(stream.next().await.expect("item").expect("text"), "Hello ");
        assert_eq!(stream.next().await.expect("item").expect("text"), "there");
        assert!(matches!(
            stream.next().await,
            Some(Err(CoreError::Upstream(_)))
        ));
        assert!(stream.next().await.is_none());
        assert_eq!(observer.events().len(), 3);
    }

    #[tokio::test]
    async fn dropping_stream_aborts_uncommitted_task() {
        let (sender, receiver) = mpsc::channel(1);
        let gate = Arc::new(CommitGate::default());
        let handle = tokio::spawn(async move {
            std::future::pending::<()>().await;
            drop(sender);
        });
        let stream = ReplyStream::new(
            "thread-1".to_string(),
            Uuid::nil(),
            receiver,
            handle,
            gate.clone(),
        );
        drop(stream);
        assert!(!gate.try_commit());
    }

    #[tokio::test]
    async fn closed_channel_reports_sink_closed() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let sink = ChannelSink::new(sender, None);
        assert_eq!(
            sink.emit(token(NodeId::Agent, "x")).await,
            Err(EventSinkClosed)
        );
    }
}

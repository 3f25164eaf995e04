use async_trait::async_trait;
use concierge_rs_protocol::{EventSink, EventSinkClosed, GenerationEvent};
use parking_lot::Mutex;

/// Sink that keeps every emitted event.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<GenerationEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<GenerationEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&self, event: GenerationEvent) -> Result<(), EventSinkClosed> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Sink whose consumer has already gone away.
#[derive(Debug, Default)]
pub struct ClosedSink;

#[async_trait]
impl EventSink for ClosedSink {
    async fn emit(&self, _event: GenerationEvent) -> Result<(), EventSinkClosed> {
        Err(EventSinkClosed)
    }
}

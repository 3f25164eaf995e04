use async_trait::async_trait;
use concierge_rs_memory::{MemoryError, MemoryMessage, MemoryRecord, MemoryStore};

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingMemoryStore;

fn unavailable() -> MemoryError {
    MemoryError::Embedding("memory backend unavailable".to_string())
}

#[async_trait]
impl MemoryStore for FailingMemoryStore {
    async fn add(
        &self,
        _messages: Vec<MemoryMessage>,
        _user_id: &str,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        Err(unavailable())
    }

    async fn search(
        &self,
        _query: &str,
        _user_id: &str,
        _limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        Err(unavailable())
    }

    async fn list(&self, _user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        Err(unavailable())
    }

    async fn clear(&self, _user_id: &str) -> Result<(), MemoryError> {
        Err(unavailable())
    }
}

//! Persist and recall gateway over a user-partitioned memory store.

use crate::model::{MemoryMessage, MemoryRecord};
use crate::{MemoryError, MemoryStore};
use concierge_rs_protocol::{Message, Role};
use log::debug;
use std::sync::Arc;

/// Thresholded access to long-term memory for one store.
#[derive(Clone)]
pub struct MemoryGateway {
    store: Arc<dyn MemoryStore>,
    threshold: f32,
}

impl MemoryGateway {
    pub fn new(store: Arc<dyn MemoryStore>, threshold: f32) -> Self {
        Self { store, threshold }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Persist the human/assistant part of a conversation as one add.
    ///
    /// Returns the number of stored records; nothing is written when no
    /// message qualifies.
    pub async fn persist(&self, messages: &[Message], user_id: &str) -> Result<usize, MemoryError> {
        let prepared = prepare_memory_messages(messages);
        if prepared.is_empty() {
            debug!("nothing to persist (user_id={})", user_id);
            return Ok(0);
        }
        let stored = self.store.add(prepared, user_id).await?;
        debug!(
            "persisted conversation memory (user_id={}, records={})",
            user_id,
            stored.len()
        );
        Ok(stored.len())
    }

    /// Store a free-text note for the user.
    pub async fn save(&self, context: &str, user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.store
            .add(vec![MemoryMessage::new("user", context)], user_id)
            .await
    }

    /// Search the user's memory and keep records scoring at least the threshold.
    pub async fn recall(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let candidates = self.store.search(query, user_id, limit).await?;
        let total = candidates.len();
        let kept = filter_by_score(candidates, self.threshold);
        debug!(
            "recalled memory (user_id={}, candidates={}, kept={})",
            user_id,
            total,
            kept.len()
        );
        Ok(kept)
    }
}

/// Keep records whose score is at least `threshold`, preserving order.
///
/// Records without a score never pass.
pub fn filter_by_score(records: Vec<MemoryRecord>, threshold: f32) -> Vec<MemoryRecord> {
    records
        .into_iter()
        .filter(|record| record.score.is_some_and(|score| score >= threshold))
        .collect()
}

/// Map human/assistant messages with content onto store messages.
pub fn prepare_memory_messages(messages: &[Message]) -> Vec<MemoryMessage> {
    messages
        .iter()
        .filter(|message| !message.content.is_empty())
        .filter_map(|message| match message.role {
            Role::Human => Some(MemoryMessage::new("user", message.content.clone())),
            Role::Ai => Some(MemoryMessage::new("assistant", message.content.clone())),
            Role::System | Role::Tool => None,
        })
        .collect()
}

//! Memory record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role-mapped message handed to a store on persist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryMessage {
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
}

impl MemoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Stored memory entry owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Role of the message the memory came from.
    pub role: String,
    /// Memory text.
    pub memory: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Similarity to the query; only set on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl MemoryRecord {
    pub fn new(user_id: &str, message: &MemoryMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            role: message.role.clone(),
            memory: message.content.clone(),
            created_at: Utc::now(),
            score: None,
        }
    }

    /// Copy of the record carrying a recall score.
    pub fn with_score(&self, score: f32) -> Self {
        Self {
            score: Some(score),
            ..self.clone()
        }
    }
}

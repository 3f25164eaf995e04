//! Memory store interface and implementations.
//!
//! Every store partitions records by user id; a search never sees another
//! user's records.

use crate::embed::rank_by_similarity;
use crate::error::MemoryError;
use crate::model::{MemoryMessage, MemoryRecord};
use crate::Embedder;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage backend for long-term user memory.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append messages to the user's memory, returning the stored records.
    ///
    /// Messages whose role and content are already stored for the user are
    /// skipped.
    async fn add(
        &self,
        messages: Vec<MemoryMessage>,
        user_id: &str,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Up to `limit` records most similar to `query`, highest score first.
    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// All records of a user in insertion order.
    async fn list(&self, user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Drop every record of a user.
    async fn clear(&self, user_id: &str) -> Result<(), MemoryError>;
}

/// Record plus the embedding used to rank it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    record: MemoryRecord,
    embedding: Vec<f32>,
}

async fn embed_records(
    embedder: &dyn Embedder,
    messages: Vec<MemoryMessage>,
    user_id: &str,
) -> Result<Vec<StoredRecord>, MemoryError> {
    if messages.is_empty() {
        return Ok(Vec::new());
    }
    let texts = messages
        .iter()
        .map(|message| message.content.clone())
        .collect::<Vec<_>>();
    let vectors = embedder.embed(texts).await?;
    Ok(messages
        .iter()
        .zip(vectors)
        .map(|(message, embedding)| StoredRecord {
            record: MemoryRecord::new(user_id, message),
            embedding,
        })
        .collect())
}

/// Keep items whose (role, content) is neither stored yet nor repeated
/// earlier in the batch.
fn retain_unseen<T>(
    items: Vec<T>,
    key: impl Fn(&T) -> (&str, &str),
    existing: &[StoredRecord],
) -> Vec<T> {
    let mut seen = existing
        .iter()
        .map(|entry| (entry.record.role.clone(), entry.record.memory.clone()))
        .collect::<HashSet<_>>();
    items
        .into_iter()
        .filter(|item| {
            let (role, content) = key(item);
            seen.insert((role.to_string(), content.to_string()))
        })
        .collect()
}

fn message_key(message: &MemoryMessage) -> (&str, &str) {
    (&message.role, &message.content)
}

fn record_key(entry: &StoredRecord) -> (&str, &str) {
    (&entry.record.role, &entry.record.memory)
}

fn rank_records(query: &[f32], stored: &[StoredRecord], limit: usize) -> Vec<MemoryRecord> {
    rank_by_similarity(
        query,
        stored
            .iter()
            .map(|entry| (&entry.record, entry.embedding.as_slice())),
        limit,
    )
    .into_iter()
    .map(|(record, score)| record.with_score(score))
    .collect()
}

/// Process-local store, lost on restart.
pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    users: RwLock<HashMap<String, Vec<StoredRecord>>>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            users: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn add(
        &self,
        messages: Vec<MemoryMessage>,
        user_id: &str,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let messages = {
            let users = self.users.read();
            let existing = users.get(user_id).map(Vec::as_slice).unwrap_or_default();
            retain_unseen(messages, message_key, existing)
        };
        let stored = embed_records(self.embedder.as_ref(), messages, user_id).await?;
        let mut users = self.users.write();
        let entries = users.entry(user_id.to_string()).or_default();
        // A concurrent add may have landed while embedding.
        let stored = retain_unseen(stored, record_key, entries);
        let records = stored.iter().map(|entry| entry.record.clone()).collect();
        entries.extend(stored);
        Ok(records)
    }

    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        if !self.users.read().contains_key(user_id) {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed_one(query).await?;
        let users = self.users.read();
        Ok(users
            .get(user_id)
            .map(|stored| rank_records(&query, stored, limit))
            .unwrap_or_default())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self
            .users
            .read()
            .get(user_id)
            .map(|stored| stored.iter().map(|entry| entry.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: &str) -> Result<(), MemoryError> {
        self.users.write().remove(user_id);
        Ok(())
    }
}

/// File-backed store keeping one JSONL file per user.
pub struct FileMemoryStore {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    write_lock: Mutex<()>,
}

impl FileMemoryStore {
    /// Create a new file-backed store under the given root.
    pub fn new(root: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("initialized file memory store (root={})", root.display());
        Ok(Self {
            root,
            embedder,
            write_lock: Mutex::new(()),
        })
    }

    /// Path to the user's JSONL file.
    fn user_path(&self, user_id: &str) -> Result<PathBuf, MemoryError> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            && !user_id.starts_with('.');
        if !valid {
            return Err(MemoryError::InvalidUser(user_id.to_string()));
        }
        Ok(self.root.join(format!("{user_id}.jsonl")))
    }

    fn load(&self, user_id: &str) -> Result<Vec<StoredRecord>, MemoryError> {
        let path = self.user_path(user_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
        let mut stored = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            stored.push(serde_json::from_str(&line)?);
        }
        Ok(stored)
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn add(
        &self,
        messages: Vec<MemoryMessage>,
        user_id: &str,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let path = self.user_path(user_id)?;
        let messages = retain_unseen(messages, message_key, &self.load(user_id)?);
        let stored = embed_records(self.embedder.as_ref(), messages, user_id).await?;
        if stored.is_empty() {
            return Ok(Vec::new());
        }
        let stored = {
            let _guard = self.write_lock.lock();
            let stored = retain_unseen(stored, record_key, &self.load(user_id)?);
            let mut buffer = String::new();
            for entry in &stored {
                buffer.push_str(&serde_json::to_string(entry)?);
                buffer.push('\n');
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(buffer.as_bytes())?;
            stored
        };
        debug!(
            "stored memory records (user_id={}, count={})",
            user_id,
            stored.len()
        );
        Ok(stored.into_iter().map(|entry| entry.record).collect())
    }

    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let stored = self.load(user_id)?;
        if stored.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed_one(query).await?;
        let ranked = rank_records(&query, &stored, limit);
        debug!(
            "searched memory (user_id={}, candidates={}, returned={})",
            user_id,
            stored.len(),
            ranked.len()
        );
        Ok(ranked)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self
            .load(user_id)?
            .into_iter()
            .map(|entry| entry.record)
            .collect())
    }

    async fn clear(&self, user_id: &str) -> Result<(), MemoryError> {
        let path = self.user_path(user_id)?;
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

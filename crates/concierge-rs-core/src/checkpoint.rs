//! Thread checkpoints: the persisted history of every conversation.

use chrono::{DateTime, Utc};
use concierge_rs_protocol::{ConversationState, Message, ThreadId, UserId};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCHEMA_VERSION: u32 = 1;

/// Summary record used for listing threads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadSummary {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&ConversationState> for ThreadSummary {
    fn from(state: &ConversationState) -> Self {
        Self {
            thread_id: state.thread_id.clone(),
            user_id: state.user_id.clone(),
            message_count: state.messages.len(),
            updated_at: state.updated_at,
        }
    }
}

/// Persistent store of conversation states keyed by thread id.
pub trait CheckpointStore: Send + Sync {
    /// Load the latest checkpoint of a thread.
    fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError>;
    /// Replace the checkpoint of a thread.
    fn save(&self, state: &ConversationState) -> Result<(), CheckpointError>;
    /// Summaries of every stored thread, most recently updated first.
    fn list(&self) -> Result<Vec<ThreadSummary>, CheckpointError>;
    /// Delete a thread, returning whether it existed.
    fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError>;
}

/// Errors returned by checkpoint stores.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing thread metadata")]
    MissingMetadata,
    #[error("invalid thread id: {0}")]
    InvalidThread(ThreadId),
}

/// Process-local checkpoints, lost on restart.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    threads: RwLock<HashMap<ThreadId, ConversationState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError> {
        Ok(self.threads.read().get(thread_id).cloned())
    }

    fn save(&self, state: &ConversationState) -> Result<(), CheckpointError> {
        self.threads
            .write()
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<ThreadSummary>, CheckpointError> {
        let mut summaries = self
            .threads
            .read()
            .values()
            .map(ThreadSummary::from)
            .collect::<Vec<_>>();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.threads.write().remove(thread_id).is_some())
    }
}

/// Line layout of a thread file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CheckpointLine {
    SchemaVersion {
        version: u32,
    },
    Thread {
        thread_id: ThreadId,
        user_id: UserId,
        #[serde(default)]
        today: String,
        updated_at: DateTime<Utc>,
    },
    Message {
        message: Message,
    },
}

#[derive(Default)]
struct ThreadReader {
    version: Option<u32>,
    header: Option<(UserId, String, DateTime<Utc>)>,
    messages: Vec<Message>,
}

impl ThreadReader {
    fn apply(&mut self, line: CheckpointLine) -> Result<(), CheckpointError> {
        match line {
            CheckpointLine::SchemaVersion { version } => {
                if version > SCHEMA_VERSION {
                    return Err(CheckpointError::UnsupportedSchema(version));
                }
                self.version = Some(version);
            }
            CheckpointLine::Thread {
                user_id,
                today,
                updated_at,
                ..
            } => self.header = Some((user_id, today, updated_at)),
            CheckpointLine::Message { message } => self.messages.push(message),
        }
        Ok(())
    }

    fn finish(self, thread_id: &str) -> Result<ConversationState, CheckpointError> {
        self.version.ok_or(CheckpointError::MissingMetadata)?;
        let (user_id, today, updated_at) = self.header.ok_or(CheckpointError::MissingMetadata)?;
        Ok(ConversationState {
            thread_id: thread_id.to_string(),
            user_id,
            today,
            messages: self.messages,
            updated_at,
        })
    }
}

/// JSONL-backed checkpoints, one file per thread.
///
/// Saves rewrite the whole file through a temporary sibling and a rename, so
/// a reader never observes a partially written checkpoint.
pub struct JsonlCheckpointStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlCheckpointStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL checkpoint store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_path(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        if !is_safe_thread_id(thread_id) {
            return Err(CheckpointError::InvalidThread(thread_id.to_string()));
        }
        Ok(self.root.join(format!("{thread_id}.jsonl")))
    }

    fn read_thread(&self, path: &Path, thread_id: &str) -> Result<ConversationState, CheckpointError> {
        let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
        let mut thread = ThreadReader::default();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            thread.apply(serde_json::from_str(&line)?)?;
        }
        thread.finish(thread_id)
    }
}

fn is_safe_thread_id(thread_id: &str) -> bool {
    !thread_id.is_empty()
        && !thread_id.starts_with('.')
        && thread_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

fn encode(state: &ConversationState) -> Result<String, CheckpointError> {
    let mut buffer = String::new();
    let mut push = |line: &CheckpointLine| -> Result<(), CheckpointError> {
        buffer.push_str(&serde_json::to_string(line)?);
        buffer.push('\n');
        Ok(())
    };
    push(&CheckpointLine::SchemaVersion {
        version: SCHEMA_VERSION,
    })?;
    push(&CheckpointLine::Thread {
        thread_id: state.thread_id.clone(),
        user_id: state.user_id.clone(),
        today: state.today.clone(),
        updated_at: state.updated_at,
    })?;
    for message in &state.messages {
        push(&CheckpointLine::Message {
            message: message.clone(),
        })?;
    }
    Ok(buffer)
}

impl CheckpointStore for JsonlCheckpointStore {
    fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError> {
        let path = self.thread_path(thread_id)?;
        if !path.exists() {
            return Ok(None);
        }
        self.read_thread(&path, thread_id).map(Some)
    }

    fn save(&self, state: &ConversationState) -> Result<(), CheckpointError> {
        let path = self.thread_path(&state.thread_id)?;
        let contents = encode(state)?;
        let tmp = path.with_extension("jsonl.tmp");
        let _guard = self.write_lock.lock();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(
            "saved checkpoint (thread_id={}, messages={})",
            state.thread_id,
            state.messages.len()
        );
        Ok(())
    }

    fn list(&self) -> Result<Vec<ThreadSummary>, CheckpointError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(thread_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_safe_thread_id(thread_id) {
                continue;
            }
            match self.read_thread(&path, thread_id) {
                Ok(state) => summaries.push(ThreadSummary::from(&state)),
                Err(err) => warn!(
                    "skipping unreadable checkpoint (thread_id={}, error={})",
                    thread_id, err
                ),
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        let path = self.thread_path(thread_id)?;
        let _guard = self.write_lock.lock();
        if path.exists() {
            info!("deleting checkpoint (thread_id={})", thread_id);
            fs::remove_file(path)?;
            Ok(true)
        } else {
            warn!("checkpoint not found (thread_id={})", thread_id);
            Ok(false)
        }
    }
}

//! Orchestrator core: model registry, thread store and turn entry points.

mod registry;
mod runtime;
mod stream;
mod threads;

pub use registry::LLMEntry;
pub use stream::ReplyStream;

use crate::checkpoint::{
    CheckpointStore, InMemoryCheckpointStore, JsonlCheckpointStore, ThreadSummary,
};
use crate::error::CoreError;
use autoagents_llm::LLMProvider;
use concierge_rs_config::{ConciergeConfig, SessionsConfig};
use concierge_rs_protocol::{
    ConversationState, EventKind, EventSink, GenerationEvent, NodeId,
};
use concierge_rs_tools::{RequestContext, ToolRegistry};
use directories::BaseDirs;
use log::{debug, error, info};
use registry::LLMRegistry;
use runtime::{TurnExecutor, TurnParams};
use std::path::PathBuf;
use std::sync::Arc;
use stream::{ChannelSink, CommitGate, TurnItem};
use threads::ThreadStore;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Entry point of the conversation runtime.
///
/// Holds the registered models, the immutable tool registry and the thread
/// checkpoints. Each `invoke`/`stream` call runs one turn of one thread.
pub struct Orchestrator {
    config: Arc<ConciergeConfig>,
    llm_registry: LLMRegistry,
    tools: ToolRegistry,
    threads: ThreadStore,
    executor: Arc<TurnExecutor>,
    observer: Option<Arc<dyn EventSink>>,
}

impl Orchestrator {
    /// Construct an orchestrator.
    ///
    /// Without an explicit checkpoint store, threads are kept in memory, or
    /// in a JSONL store when `sessions.enabled` is set.
    pub fn new(
        config: ConciergeConfig,
        tools: ToolRegistry,
        checkpoints: Option<Arc<dyn CheckpointStore>>,
        observer: Option<Arc<dyn EventSink>>,
    ) -> Result<Self, CoreError> {
        info!("initializing orchestrator");
        debug!(
            "orchestrator config (tools={}, window={}, max_tool_iterations={}, sessions={})",
            tools.len(),
            config.window.max_messages,
            config.orchestrator.max_tool_iterations,
            config.sessions.enabled
        );
        let checkpoints = match checkpoints {
            Some(store) => store,
            None => build_default_checkpoint_store(&config.sessions)?,
        };
        let config = Arc::new(config);
        let threads = ThreadStore::new(checkpoints);
        let executor = Arc::new(TurnExecutor::new(
            config.clone(),
            threads.clone(),
            tools.clone(),
        ));
        info!("orchestrator initialized");
        Ok(Self {
            config,
            llm_registry: LLMRegistry::default(),
            tools,
            threads,
            executor,
            observer,
        })
    }

    pub fn config(&self) -> &ConciergeConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Register a chat model under its `provider:model` id.
    pub fn register_model(&self, entry: LLMEntry) -> Result<(), CoreError> {
        self.llm_registry.insert_entry(entry)
    }

    /// Registered model ids.
    pub fn models(&self) -> Vec<String> {
        self.llm_registry.list_ids()
    }

    /// Run one turn and return the final reply.
    pub async fn invoke(
        &self,
        text: impl Into<String>,
        request: RequestContext,
    ) -> Result<String, CoreError> {
        let llm = self.resolve_llm(&request.model)?;
        let turn_id = Uuid::new_v4();
        let result = self
            .executor
            .run_turn(TurnParams {
                turn_id,
                input: text.into(),
                request: request.clone(),
                llm,
                event_sink: self.observer.clone(),
                stream: false,
                gate: None,
            })
            .await;
        if let Err(err) = &result {
            error!(
                "turn failed (thread_id={}, turn_id={}, error={})",
                request.thread_id, turn_id, err
            );
            notify_failure(self.observer.as_deref(), turn_id, &request, err).await;
        }
        result
    }

    /// Start one turn and stream the reply as text deltas.
    ///
    /// The turn runs on a spawned task; dropping the returned stream before
    /// the turn commits cancels it.
    pub fn stream(
        &self,
        text: impl Into<String>,
        request: RequestContext,
    ) -> Result<ReplyStream, CoreError> {
        let llm = self.resolve_llm(&request.model)?;
        let turn_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.config.orchestrator.stream_buffer.max(1));
        let sink: Arc<dyn EventSink> =
            Arc::new(ChannelSink::new(sender.clone(), self.observer.clone()));
        let gate = Arc::new(CommitGate::default());
        let executor = self.executor.clone();
        let observer = self.observer.clone();
        let thread_id = request.thread_id.clone();
        let input = text.into();
        let turn_gate = gate.clone();
        info!(
            "streaming turn (thread_id={}, turn_id={}, prompt_len={})",
            thread_id,
            turn_id,
            input.len()
        );
        let handle = tokio::spawn(async move {
            let result = executor
                .run_turn(TurnParams {
                    turn_id,
                    input,
                    request: request.clone(),
                    llm,
                    event_sink: Some(sink),
                    stream: true,
                    gate: Some(turn_gate),
                })
                .await;
            match result {
                Ok(_) => {}
                Err(CoreError::Cancelled) => {
                    info!(
                        "turn cancelled by consumer (thread_id={}, turn_id={})",
                        request.thread_id, turn_id
                    );
                }
                Err(err) => {
                    error!(
                        "turn failed (thread_id={}, turn_id={}, error={})",
                        request.thread_id, turn_id, err
                    );
                    notify_failure(observer.as_deref(), turn_id, &request, &err).await;
                    let _ = sender.send(TurnItem::Failed(err)).await;
                }
            }
        });
        Ok(ReplyStream::new(thread_id, turn_id, receiver, handle, gate))
    }

    /// Snapshot of a thread owned by `user_id`.
    pub fn get_state(&self, user_id: &str, thread_id: &str) -> Result<ConversationState, CoreError> {
        self.threads.get(user_id, thread_id)
    }

    pub fn list_threads(&self) -> Result<Vec<ThreadSummary>, CoreError> {
        self.threads.list()
    }

    /// Delete a thread once no turn is running on it.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<bool, CoreError> {
        info!("deleting thread (thread_id={})", thread_id);
        self.threads.delete(thread_id).await
    }

    fn resolve_llm(&self, model: &str) -> Result<Arc<dyn LLMProvider>, CoreError> {
        Ok(self.llm_registry.get_entry(model)?.provider)
    }
}

async fn notify_failure(
    observer: Option<&dyn EventSink>,
    turn_id: Uuid,
    request: &RequestContext,
    err: &CoreError,
) {
    if let Some(observer) = observer {
        let _ = observer
            .emit(GenerationEvent::new(
                turn_id,
                request.thread_id.clone(),
                NodeId::Agent,
                EventKind::Error {
                    message: err.to_string(),
                },
            ))
            .await;
    }
}

fn build_default_checkpoint_store(
    config: &SessionsConfig,
) -> Result<Arc<dyn CheckpointStore>, CoreError> {
    if !config.enabled {
        info!("using in-memory checkpoint store");
        return Ok(Arc::new(InMemoryCheckpointStore::new()));
    }
    let root = resolve_storage_root(config.path.as_deref(), "sessions")?;
    info!("initializing checkpoint store (root={})", root.display());
    Ok(Arc::new(JsonlCheckpointStore::new(root)?))
}

/// Resolve an absolute storage root for a config-specified path.
///
/// Relative paths resolve against the working directory; without a path the
/// root is `~/.concierge/<fallback_dir>`.
pub fn resolve_storage_root(path: Option<&str>, fallback_dir: &str) -> Result<PathBuf, CoreError> {
    let cwd = std::env::current_dir()?;
    if let Some(path) = path {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            debug!("using absolute storage root: {}", path.display());
            return Ok(path);
        }
        debug!(
            "resolving storage root relative to cwd: {}",
            cwd.join(&path).display()
        );
        return Ok(cwd.join(path));
    }

    if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        return Ok(home.join(".concierge").join(fallback_dir));
    }

    Ok(cwd.join(".concierge").join(fallback_dir))
}

#[cfg(test)]
mod tests {
    use super::{build_default_checkpoint_store, resolve_storage_root};
    use concierge_rs_config::SessionsConfig;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn resolve_storage_root_respects_absolute_and_relative_paths() {
        let temp = tempdir().expect("tempdir");
        let absolute = temp.path().join("sessions");
        let absolute_str = absolute.to_string_lossy().to_string();
        let resolved = resolve_storage_root(Some(&absolute_str), "sessions").expect("absolute");
        assert_eq!(resolved, absolute);

        let cwd = std::env::current_dir().expect("cwd");
        let resolved = resolve_storage_root(Some("tmp/sessions"), "sessions").expect("relative");
        assert_eq!(resolved, cwd.join("tmp/sessions"));

        let fallback = resolve_storage_root(None, "sessions").expect("fallback");
        assert!(fallback.ends_with(".concierge/sessions"));
    }

    #[test]
    fn enabled_sessions_create_jsonl_root() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("threads");
        let config = SessionsConfig {
            enabled: true,
            path: Some(root.to_string_lossy().to_string()),
        };
        let store = build_default_checkpoint_store(&config).expect("store");
        assert!(root.is_dir());
        assert!(store.list().expect("list").is_empty());
    }
}

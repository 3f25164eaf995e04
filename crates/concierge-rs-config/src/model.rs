//! Configuration schema for Concierge.

use serde::{Deserialize, Serialize};

/// Root config for the Concierge runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConciergeConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_forms")]
    pub forms: Vec<FormConfig>,
}

impl Default for ConciergeConfig {
    fn default() -> Self {
        Self {
            schema: None,
            model: ModelConfig::default(),
            window: WindowConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            retry: RetryConfig::default(),
            memory: MemoryConfig::default(),
            retrieval: RetrievalConfig::default(),
            sessions: SessionsConfig::default(),
            logging: LoggingConfig::default(),
            forms: default_forms(),
        }
    }
}

impl ConciergeConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ConciergeConfigBuilder {
        ConciergeConfigBuilder::new()
    }
}

/// Builder for assembling a `ConciergeConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ConciergeConfigBuilder {
    config: ConciergeConfig,
}

impl ConciergeConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ConciergeConfig::default(),
        }
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.config.model = model;
        self
    }

    pub fn window(mut self, window: WindowConfig) -> Self {
        self.config.window = window;
        self
    }

    pub fn orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.config.orchestrator = orchestrator;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    pub fn sessions(mut self, sessions: SessionsConfig) -> Self {
        self.config.sessions = sessions;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Replace the registered form definitions.
    pub fn forms(mut self, forms: Vec<FormConfig>) -> Self {
        self.config.forms = forms;
        self
    }

    /// Finalize and return the built `ConciergeConfig`.
    pub fn build(self) -> ConciergeConfig {
        self.config
    }
}

/// Chat model selection and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Model id in `provider:model` form used when a request names none.
    #[serde(default = "default_model_id")]
    pub default: String,
    /// Model ids offered to callers.
    #[serde(default = "default_available_models")]
    pub available: Vec<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model_id(),
            available: default_available_models(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model_id() -> String {
    "openai:gpt-4o".to_string()
}

fn default_available_models() -> Vec<String> {
    vec![
        "openai:gpt-4o".to_string(),
        "anthropic:claude-3-5-sonnet-20241022".to_string(),
        "openai:gpt-4o-mini".to_string(),
    ]
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

/// History window applied before every model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    /// Budget in the message-count metric.
    #[serde(default = "default_window_budget")]
    pub max_messages: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_messages: default_window_budget(),
        }
    }
}

fn default_window_budget() -> usize {
    10
}

/// Conversation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Replaces the built-in agent instruction when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum number of tool dispatch rounds per turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Capacity of the bounded channel feeding a streamed reply.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    /// Run the tool calls of one model response concurrently.
    #[serde(default = "default_parallel_tools")]
    pub parallel_tools: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tool_iterations: default_max_tool_iterations(),
            stream_buffer: default_stream_buffer(),
            parallel_tools: default_parallel_tools(),
        }
    }
}

fn default_max_tool_iterations() -> usize {
    8
}

fn default_stream_buffer() -> usize {
    64
}

fn default_parallel_tools() -> bool {
    true
}

/// Retry policy for transient model provider failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

/// Long-term user memory settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Root directory of the file-backed store; in-memory when unset.
    #[serde(default)]
    pub path: Option<String>,
    /// Minimum score a recalled record needs to be returned.
    #[serde(default = "default_threshold")]
    pub recall_threshold: f32,
    /// Number of candidates fetched by the memory-search tool.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            recall_threshold: default_threshold(),
            recall_limit: default_recall_limit(),
        }
    }
}

fn default_threshold() -> f32 {
    0.3
}

fn default_recall_limit() -> usize {
    3
}

/// Knowledge-base retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_embeddings_model")]
    pub embeddings_model: String,
    /// Minimum cosine similarity a document needs to be returned.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Nearest neighbours fetched before threshold filtering.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embeddings_model: default_embeddings_model(),
            threshold: default_threshold(),
            top_k: default_top_k(),
        }
    }
}

fn default_embeddings_model() -> String {
    "openai:text-embedding-3-small".to_string()
}

fn default_top_k() -> usize {
    4
}

/// Thread checkpoint persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionsConfig {
    /// Persist checkpoints to disk; memory-only when false.
    #[serde(default = "default_sessions_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_sessions_enabled(),
            path: None,
        }
    }
}

fn default_sessions_enabled() -> bool {
    true
}

/// Process logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Console,
    /// One JSON object per line.
    Json,
}

/// A named form collected field by field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormConfig {
    pub name: String,
    pub description: String,
    /// Required fields in collection order.
    pub fields: Vec<String>,
}

impl FormConfig {
    pub fn new(name: &str, description: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }
}

/// Forms shipped with the default configuration.
pub fn default_forms() -> Vec<FormConfig> {
    vec![
        FormConfig::new(
            "address_change",
            "Please provide your new address.",
            &["address", "city"],
        ),
        FormConfig::new(
            "book_appointment",
            "Please provide your preferred date and time.",
            &["date", "time"],
        ),
        FormConfig::new(
            "open_account",
            "Please provide your account the following information.",
            &["name", "phone_number", "email", "location"],
        ),
    ]
}

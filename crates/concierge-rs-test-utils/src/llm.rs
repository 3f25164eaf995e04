use async_trait::async_trait;
use autoagents_llm::chat::{
    ChatMessage, ChatProvider, ChatResponse, StreamChunk, StructuredOutputFormat, Tool,
};
use autoagents_llm::completion::{CompletionProvider, CompletionRequest, CompletionResponse};
use autoagents_llm::embedding::EmbeddingProvider;
use autoagents_llm::error::LLMError;
use autoagents_llm::models::ModelsProvider;
use autoagents_llm::{FunctionCall, LLMProvider, ToolCall};
use futures_util::Stream;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LLMError>> + Send>>;

/// Build a provider tool call with JSON-encoded arguments.
pub fn llm_tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        call_type: "function".to_string(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct FixedChatResponse {
    text: String,
    tool_calls: Option<Vec<ToolCall>>,
}

impl FixedChatResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: None,
        }
    }

    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Some(tool_calls),
        }
    }

    /// Text chunks followed by completed tool calls, as a provider stream would yield them.
    fn chunks(&self) -> Vec<Result<StreamChunk, LLMError>> {
        let mut chunks = self
            .text
            .split_inclusive(' ')
            .map(|piece| Ok(StreamChunk::Text(piece.to_string())))
            .collect::<Vec<_>>();
        for (index, tool_call) in self.tool_calls.iter().flatten().enumerate() {
            chunks.push(Ok(StreamChunk::ToolUseComplete {
                index,
                tool_call: tool_call.clone(),
            }));
        }
        chunks
    }
}

impl std::fmt::Display for FixedChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl ChatResponse for FixedChatResponse {
    fn text(&self) -> Option<String> {
        Some(self.text.clone())
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        self.tool_calls.clone()
    }
}

/// One chat request as observed by [`ScriptedLLM`].
#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub messages: Vec<ChatMessage>,
    /// Names of the tools bound to the call.
    pub tools: Vec<String>,
    pub structured: bool,
    pub streamed: bool,
}

/// Replays queued responses in order and records every request.
///
/// Once the queue is empty it answers with empty text.
#[derive(Debug, Clone)]
pub struct ScriptedLLM {
    responses: Arc<Mutex<VecDeque<FixedChatResponse>>>,
    calls: Arc<Mutex<Vec<RecordedChat>>>,
}

impl ScriptedLLM {
    pub fn new(responses: Vec<FixedChatResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedChat> {
        self.calls.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        json_schema: &Option<StructuredOutputFormat>,
        streamed: bool,
    ) -> FixedChatResponse {
        self.calls.lock().push(RecordedChat {
            messages: messages.to_vec(),
            tools: tools
                .unwrap_or(&[])
                .iter()
                .map(|tool| tool.function.name.clone())
                .collect(),
            structured: json_schema.is_some(),
            streamed,
        });
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| FixedChatResponse::new(""))
    }
}

#[async_trait]
impl ChatProvider for ScriptedLLM {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        json_schema: Option<StructuredOutputFormat>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        Ok(Box::new(self.next(messages, tools, &json_schema, false)))
    }

    async fn chat_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        json_schema: Option<StructuredOutputFormat>,
    ) -> Result<LlmStream, LLMError> {
        let response = self.next(messages, tools, &json_schema, true);
        Ok(Box::pin(stream::iter(response.chunks())))
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLLM {
    async fn complete(
        &self,
        _req: &CompletionRequest,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<CompletionResponse, LLMError> {
        Ok(CompletionResponse {
            text: "mock completion".to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedLLM {
    async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, LLMError> {
        Ok(input.into_iter().map(|_| vec![0.0, 0.0]).collect())
    }
}

#[async_trait]
impl ModelsProvider for ScriptedLLM {}

impl LLMProvider for ScriptedLLM {}

/// Provider whose every call fails.
#[derive(Debug, Clone)]
pub struct FailingLLM {
    message: String,
    attempts: Arc<AtomicUsize>,
}

impl FailingLLM {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> LLMError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        LLMError::ProviderError(self.message.clone())
    }
}

#[async_trait]
impl ChatProvider for FailingLLM {
    async fn chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        Err(self.fail())
    }

    async fn chat_stream_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<LlmStream, LLMError> {
        Err(self.fail())
    }
}

#[async_trait]
impl CompletionProvider for FailingLLM {
    async fn complete(
        &self,
        _req: &CompletionRequest,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<CompletionResponse, LLMError> {
        Err(LLMError::ProviderError(self.message.clone()))
    }
}

#[async_trait]
impl EmbeddingProvider for FailingLLM {
    async fn embed(&self, _input: Vec<String>) -> Result<Vec<Vec<f32>>, LLMError> {
        Err(LLMError::ProviderError(self.message.clone()))
    }
}

#[async_trait]
impl ModelsProvider for FailingLLM {}

impl LLMProvider for FailingLLM {}

/// Fails the first `failures` chat calls, then defers to a [`ScriptedLLM`].
#[derive(Debug, Clone)]
pub struct FlakyLLM {
    failures: usize,
    attempts: Arc<AtomicUsize>,
    inner: ScriptedLLM,
}

impl FlakyLLM {
    pub fn new(failures: usize, inner: ScriptedLLM) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicUsize::new(0)),
            inner,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures
    }
}

#[async_trait]
impl ChatProvider for FlakyLLM {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        json_schema: Option<StructuredOutputFormat>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        if self.should_fail() {
            return Err(LLMError::ProviderError("transient failure".to_string()));
        }
        self.inner.chat_with_tools(messages, tools, json_schema).await
    }

    async fn chat_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        json_schema: Option<StructuredOutputFormat>,
    ) -> Result<LlmStream, LLMError> {
        if self.should_fail() {
            return Err(LLMError::ProviderError("transient failure".to_string()));
        }
        self.inner
            .chat_stream_with_tools(messages, tools, json_schema)
            .await
    }
}

#[async_trait]
impl CompletionProvider for FlakyLLM {
    async fn complete(
        &self,
        req: &CompletionRequest,
        json_schema: Option<StructuredOutputFormat>,
    ) -> Result<CompletionResponse, LLMError> {
        self.inner.complete(req, json_schema).await
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyLLM {
    async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, LLMError> {
        self.inner.embed(input).await
    }
}

#[async_trait]
impl ModelsProvider for FlakyLLM {}

impl LLMProvider for FlakyLLM {}

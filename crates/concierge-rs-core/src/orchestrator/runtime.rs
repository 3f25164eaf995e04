//! Turn execution: the Agent, ToolDispatch and MemoryPersist states.

use super::stream::CommitGate;
use super::threads::ThreadStore;
use crate::error::CoreError;
use crate::llm::{from_llm_tool_call, to_chat_messages, to_llm_tools};
use crate::prompt::PromptBuilder;
use crate::retry::RetryPolicy;
use crate::transition::Transition;
use crate::window::MessageWindow;
use autoagents_llm::LLMProvider;
use autoagents_llm::chat::{ChatMessage, ChatProvider, StreamChunk, Tool as LlmTool};
use chrono::Utc;
use concierge_rs_config::ConciergeConfig;
use concierge_rs_memory::MemoryGateway;
use concierge_rs_protocol::{
    ConversationState, EventKind, EventSink, GenerationEvent, Message, NodeId, ThreadId,
    TokenContent, ToolError, TurnId,
};
use concierge_rs_tools::{RequestContext, ToolContext, ToolRegistry, TurnServices};
use futures_util::StreamExt;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Parameters for a single turn execution.
pub(crate) struct TurnParams {
    pub(crate) turn_id: TurnId,
    /// Input message from the user.
    pub(crate) input: String,
    pub(crate) request: RequestContext,
    pub(crate) llm: Arc<dyn LLMProvider>,
    pub(crate) event_sink: Option<Arc<dyn EventSink>>,
    /// Stream model tokens; the sink then belongs to the reply stream.
    pub(crate) stream: bool,
    pub(crate) gate: Option<Arc<CommitGate>>,
}

/// Executes turns against the shared tools, prompt and checkpoints.
pub(crate) struct TurnExecutor {
    config: Arc<ConciergeConfig>,
    threads: ThreadStore,
    tools: ToolRegistry,
    llm_tools: Vec<LlmTool>,
    prompt: PromptBuilder,
    window: MessageWindow,
    retry: RetryPolicy,
}

/// Why one model call attempt failed.
enum CallFailure {
    Provider { message: String, emitted: bool },
    Cancelled,
}

/// Emits turn events; a closed sink cancels streamed turns only.
struct TurnEmitter {
    sink: Option<Arc<dyn EventSink>>,
    turn_id: TurnId,
    thread_id: ThreadId,
    cancellable: bool,
}

impl TurnEmitter {
    async fn emit(&self, node: NodeId, kind: EventKind) -> Result<(), CoreError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let event = GenerationEvent::new(self.turn_id, self.thread_id.clone(), node, kind);
        match sink.emit(event).await {
            Ok(()) => Ok(()),
            Err(_) if self.cancellable => Err(CoreError::Cancelled),
            Err(_) => Ok(()),
        }
    }

    /// Emit after the turn has committed; the consumer may be gone by then.
    async fn emit_quiet(&self, node: NodeId, kind: EventKind) {
        if let Some(sink) = &self.sink {
            let event = GenerationEvent::new(self.turn_id, self.thread_id.clone(), node, kind);
            let _ = sink.emit(event).await;
        }
    }
}

impl TurnExecutor {
    pub(crate) fn new(config: Arc<ConciergeConfig>, threads: ThreadStore, tools: ToolRegistry) -> Self {
        let llm_tools = to_llm_tools(&tools.specs());
        let prompt = PromptBuilder::new(config.orchestrator.system_prompt.clone());
        let window = MessageWindow::new(config.window.max_messages);
        let retry = RetryPolicy::from(&config.retry);
        Self {
            config,
            threads,
            tools,
            llm_tools,
            prompt,
            window,
            retry,
        }
    }

    /// Run one turn end-to-end and return the final reply text.
    ///
    /// The thread checkpoint is only written once the turn reaches
    /// MemoryPersist; any earlier failure leaves it as it was.
    pub(crate) async fn run_turn(&self, params: TurnParams) -> Result<String, CoreError> {
        let TurnParams {
            turn_id,
            input,
            request,
            llm,
            event_sink,
            stream,
            gate,
        } = params;
        let thread_id = request.thread_id.clone();
        info!(
            "starting turn (thread_id={}, user_id={}, model={}, streaming={}, prompt_len={})",
            thread_id,
            request.user_id,
            request.model,
            stream,
            input.len()
        );

        let _thread_guard = self.threads.lock(&thread_id).await;
        let mut state = self.threads.load_or_create(&thread_id, &request.user_id)?;
        state.today = Utc::now().to_rfc3339();
        state.messages.push(Message::human(input));

        let emitter = TurnEmitter {
            sink: event_sink.clone(),
            turn_id,
            thread_id: thread_id.clone(),
            cancellable: stream,
        };
        let memory = MemoryGateway::new(
            request.memory.clone(),
            self.config.memory.recall_threshold,
        );
        let services = Arc::new(TurnServices {
            llm: llm.clone(),
            memory: memory.clone(),
            recall_limit: self.config.memory.recall_limit,
            today: state.today.clone(),
            event_sink: if stream { event_sink } else { None },
        });
        let tool_ctx = ToolContext::new(request.clone(), turn_id, services);

        let max_iterations = self.config.orchestrator.max_tool_iterations;
        let mut iterations = 0;
        loop {
            let bind_tools = iterations < max_iterations;
            emitter.emit(NodeId::Agent, EventKind::NodeStarted).await?;
            let mut reply = self
                .call_agent(llm.as_ref(), &state, &emitter, bind_tools)
                .await?;
            if !bind_tools && reply.has_tool_calls() {
                warn!(
                    "dropping tool calls past iteration bound (thread_id={}, calls={}, bound={})",
                    thread_id,
                    reply.tool_calls.len(),
                    max_iterations
                );
                reply.tool_calls.clear();
            }
            emitter
                .emit(
                    NodeId::Agent,
                    EventKind::ModelFinished {
                        tool_calls: reply.tool_calls.len(),
                    },
                )
                .await?;
            state.messages.push(reply);

            match Transition::after(state.messages.last()) {
                Transition::ToolDispatch => {
                    iterations += 1;
                    self.dispatch_tools(&tool_ctx, &mut state, &emitter).await?;
                }
                Transition::MemoryPersist => break,
            }
        }

        if let Some(gate) = &gate
            && !gate.try_commit()
        {
            return Err(CoreError::Cancelled);
        }
        emitter
            .emit_quiet(NodeId::SaveMemories, EventKind::NodeStarted)
            .await;
        let stored = memory.persist(&state.messages, &request.user_id).await?;
        state.updated_at = Utc::now();
        self.threads.save(&state)?;
        let reply = state
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        info!(
            "turn completed (thread_id={}, tool_rounds={}, memories={}, reply_len={})",
            thread_id,
            iterations,
            stored,
            reply.len()
        );
        emitter
            .emit_quiet(
                NodeId::SaveMemories,
                EventKind::TurnCompleted {
                    message: reply.clone(),
                },
            )
            .await;
        Ok(reply)
    }

    /// Agent node: window, prompt and one model call with retries.
    async fn call_agent(
        &self,
        llm: &dyn LLMProvider,
        state: &ConversationState,
        emitter: &TurnEmitter,
        bind_tools: bool,
    ) -> Result<Message, CoreError> {
        let history = self.window.trim(&state.messages);
        let messages = to_chat_messages(&self.prompt.build(&state.today, history));
        let tools = (bind_tools && !self.llm_tools.is_empty()).then_some(self.llm_tools.as_slice());
        debug!(
            "calling model (thread_id={}, messages={}, tools={})",
            emitter.thread_id,
            messages.len(),
            tools.map_or(0, <[LlmTool]>::len)
        );

        let mut attempt = 1;
        loop {
            let result = if emitter.cancellable {
                self.stream_once(llm, &messages, tools, emitter).await
            } else {
                self.chat_once(llm, &messages, tools).await
            };
            match result {
                Ok(message) => return Ok(message),
                Err(CallFailure::Cancelled) => return Err(CoreError::Cancelled),
                Err(CallFailure::Provider { message, emitted })
                    if !emitted && self.retry.allows_retry(attempt) =>
                {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "model call failed, retrying (thread_id={}, attempt={}, delay_ms={}, error={})",
                        emitter.thread_id,
                        attempt,
                        delay.as_millis(),
                        message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(CallFailure::Provider { message, .. }) => {
                    error!(
                        "model call failed (thread_id={}, attempts={}, error={})",
                        emitter.thread_id, attempt, message
                    );
                    return Err(CoreError::Upstream(message));
                }
            }
        }
    }

    async fn chat_once(
        &self,
        llm: &dyn LLMProvider,
        messages: &[ChatMessage],
        tools: Option<&[LlmTool]>,
    ) -> Result<Message, CallFailure> {
        let response = llm
            .chat_with_tools(messages, tools, None)
            .await
            .map_err(|err| CallFailure::Provider {
                message: err.to_string(),
                emitted: false,
            })?;
        let tool_calls = response
            .tool_calls()
            .unwrap_or_default()
            .iter()
            .map(from_llm_tool_call)
            .collect();
        Ok(Message::ai_with_tool_calls(
            response.text().unwrap_or_default(),
            tool_calls,
        ))
    }

    async fn stream_once(
        &self,
        llm: &dyn LLMProvider,
        messages: &[ChatMessage],
        tools: Option<&[LlmTool]>,
        emitter: &TurnEmitter,
    ) -> Result<Message, CallFailure> {
        let mut stream = llm
            .chat_stream_with_tools(messages, tools, None)
            .await
            .map_err(|err| CallFailure::Provider {
                message: err.to_string(),
                emitted: false,
            })?;
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut emitted = false;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Err(err) => {
                    return Err(CallFailure::Provider {
                        message: err.to_string(),
                        emitted,
                    });
                }
                Ok(StreamChunk::Text(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    emitted = true;
                    emitter
                        .emit(
                            NodeId::Agent,
                            EventKind::ModelToken {
                                content: TokenContent::Text(delta),
                            },
                        )
                        .await
                        .map_err(|_| CallFailure::Cancelled)?;
                }
                Ok(StreamChunk::ToolUseComplete { tool_call, .. }) => {
                    tool_calls.push(from_llm_tool_call(&tool_call));
                }
                Ok(_) => {}
            }
        }
        Ok(Message::ai_with_tool_calls(text, tool_calls))
    }

    /// ToolDispatch node: run every call of the last reply and append the
    /// results in call order.
    async fn dispatch_tools(
        &self,
        ctx: &ToolContext,
        state: &mut ConversationState,
        emitter: &TurnEmitter,
    ) -> Result<(), CoreError> {
        let calls = state
            .messages
            .last()
            .map(|message| message.tool_calls.clone())
            .unwrap_or_default();
        emitter.emit(NodeId::Tools, EventKind::NodeStarted).await?;
        for call in &calls {
            emitter
                .emit(
                    NodeId::Tools,
                    EventKind::ToolStarted {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                )
                .await?;
        }

        let parallel = self.config.orchestrator.parallel_tools
            && calls.len() > 1
            && calls.iter().all(|call| {
                self.tools
                    .get(&call.name)
                    .is_none_or(|tool| tool.supports_parallel())
            });
        debug!(
            "dispatching tools (thread_id={}, calls={}, parallel={})",
            emitter.thread_id,
            calls.len(),
            parallel
        );
        let outcomes: Vec<Result<String, ToolError>> = if parallel {
            join_all(calls.iter().map(|call| async move {
                let call_ctx = ctx.for_call(call);
                self.tools.execute(&call_ctx, call).await
            }))
            .await
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in &calls {
                outcomes.push(self.tools.execute(&ctx.for_call(call), call).await);
            }
            outcomes
        };

        for (call, outcome) in calls.iter().zip(outcomes) {
            let success = outcome.is_ok();
            let content = match outcome {
                Ok(text) => text,
                Err(err) => {
                    warn!(
                        "tool call failed (thread_id={}, tool={}, call_id={}, error={})",
                        emitter.thread_id, call.name, call.id, err
                    );
                    format!("Error: {err}")
                }
            };
            state.messages.push(Message::tool_result(call, content));
            emitter
                .emit(
                    NodeId::Tools,
                    EventKind::ToolFinished {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        success,
                    },
                )
                .await?;
        }
        Ok(())
    }
}

use async_trait::async_trait;
use autoagents_llm::LLMProvider;
use concierge_rs_config::{ConciergeConfig, RetryConfig, SessionsConfig, default_forms};
use concierge_rs_core::{CoreError, LLMEntry, Orchestrator};
use concierge_rs_memory::{InMemoryStore, MemoryStore, RetrievalGateway};
use concierge_rs_protocol::{EventKind, Role, ToolError};
use concierge_rs_test_utils::{
    CollectingSink, FailingLLM, FixedChatResponse, FlakyLLM, KeywordEmbedder, ScriptedLLM,
    llm_tool_call,
};
use concierge_rs_tools::{
    BuiltinSources, FORM_SUBMITTED, FormRegistry, RequestContext, StaticCustomerDirectory, Tool,
    ToolContext, ToolRegistry, builtin_tool_registry, default_knowledge_base,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Notify;

const MODEL: &str = "openai:gpt-4o";

fn base_config() -> ConciergeConfig {
    ConciergeConfig::builder()
        .sessions(SessionsConfig {
            enabled: false,
            path: None,
        })
        .retry(RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        })
        .build()
}

async fn tools() -> ToolRegistry {
    let knowledge = RetrievalGateway::build(
        default_knowledge_base(),
        Arc::new(KeywordEmbedder::default()),
        0.3,
        4,
    )
    .await
    .expect("knowledge base");
    builtin_tool_registry(&BuiltinSources {
        customers: Arc::new(StaticCustomerDirectory::sample()),
        knowledge: Arc::new(knowledge),
        forms: Arc::new(FormRegistry::from_config(&default_forms())),
    })
    .expect("tools")
}

async fn orchestrator(config: ConciergeConfig, llm: Arc<dyn LLMProvider>) -> Orchestrator {
    let orchestrator = Orchestrator::new(config, tools().await, None, None).expect("orchestrator");
    orchestrator
        .register_model(LLMEntry::new(MODEL, llm))
        .expect("register model");
    orchestrator
}

fn memory() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(Arc::new(KeywordEmbedder::default())))
}

fn request(thread_id: &str, store: Arc<InMemoryStore>) -> RequestContext {
    RequestContext::new(thread_id, "123", MODEL, store)
}

fn roles(orchestrator: &Orchestrator, thread_id: &str) -> Vec<Role> {
    orchestrator
        .get_state("123", thread_id)
        .expect("state")
        .messages
        .iter()
        .map(|message| message.role)
        .collect()
}

#[tokio::test]
async fn invoke_runs_tool_loop_and_persists_memory() {
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::with_tool_calls(
            "",
            vec![llm_tool_call(
                "call_1",
                "get_customer_info",
                json!({ "customer_id": "123" }),
            )],
        ),
        FixedChatResponse::new("You are Alice Smith."),
    ]);
    let orchestrator = orchestrator(base_config(), Arc::new(llm.clone())).await;
    let store = memory();

    let reply = orchestrator
        .invoke("Who am I?", request("thread-1", store.clone()))
        .await
        .expect("invoke");
    assert_eq!(reply, "You are Alice Smith.");
    assert_eq!(
        roles(&orchestrator, "thread-1"),
        vec![Role::Human, Role::Ai, Role::Tool, Role::Ai]
    );

    let state = orchestrator.get_state("123", "thread-1").expect("state");
    assert!(state.messages[2].content.contains("Alice Smith"));
    assert_eq!(state.messages[2].tool_call_id.as_deref(), Some("call_1"));
    assert!(!state.today.is_empty());

    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].tools.len(), orchestrator.tools().len());
    assert!(calls[0].messages[1].content.starts_with("Today is "));
    assert_eq!(calls[1].messages.len(), 5);

    let memories = store
        .list("123")
        .await
        .expect("list")
        .into_iter()
        .map(|record| record.memory)
        .collect::<Vec<_>>();
    assert_eq!(memories, vec!["Who am I?", "You are Alice Smith."]);
}

#[tokio::test]
async fn stream_excludes_form_extraction_tokens() {
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::with_tool_calls(
            "",
            vec![llm_tool_call(
                "call_1",
                "submit_form",
                json!({
                    "form_name": "book_appointment",
                    "form_data": "date 2024-05-02, time 10:00"
                }),
            )],
        ),
        FixedChatResponse::new("{\"date\": \"2024-05-02\", \"time\": \"10:00\"}"),
        FixedChatResponse::new("Your appointment is booked."),
    ]);
    let orchestrator = orchestrator(base_config(), Arc::new(llm.clone())).await;

    let reply = orchestrator
        .stream("Book me in tomorrow at ten", request("thread-1", memory()))
        .expect("stream")
        .collect_text()
        .await
        .expect("reply");
    assert_eq!(reply, "Your appointment is booked.");

    let state = orchestrator.get_state("123", "thread-1").expect("state");
    assert_eq!(state.messages[2].content, FORM_SUBMITTED);
    let calls = llm.calls();
    assert!(calls[1].structured && calls[1].streamed);
    assert!(calls[1].tools.is_empty());
}

#[tokio::test]
async fn tool_loop_is_bounded() {
    let search = || {
        FixedChatResponse::with_tool_calls(
            "I could not find it.",
            vec![llm_tool_call(
                "call_x",
                "search_memory",
                json!({ "query": "pizza" }),
            )],
        )
    };
    let llm = ScriptedLLM::new(vec![search(), search()]);
    let mut config = base_config();
    config.orchestrator.max_tool_iterations = 1;
    let orchestrator = orchestrator(config, Arc::new(llm.clone())).await;

    let reply = orchestrator
        .invoke("What do I like?", request("thread-1", memory()))
        .await
        .expect("invoke");
    assert_eq!(reply, "I could not find it.");

    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].tools.is_empty());
    assert!(calls[1].tools.is_empty());
    let state = orchestrator.get_state("123", "thread-1").expect("state");
    assert!(state.messages.last().is_some_and(|m| !m.has_tool_calls()));
}

#[tokio::test]
async fn transient_provider_errors_are_retried() {
    let llm = FlakyLLM::new(2, ScriptedLLM::new(vec![FixedChatResponse::new("Hello!")]));
    let orchestrator = orchestrator(base_config(), Arc::new(llm.clone())).await;

    let reply = orchestrator
        .invoke("Hi", request("thread-1", memory()))
        .await
        .expect("invoke");
    assert_eq!(reply, "Hello!");
    assert_eq!(llm.attempts(), 3);
}

#[tokio::test]
async fn upstream_failure_leaves_checkpoint_untouched() {
    let orchestrator = orchestrator(
        base_config(),
        Arc::new(ScriptedLLM::new(vec![FixedChatResponse::new("Hello!")])),
    )
    .await;
    let failing = FailingLLM::new("provider down");
    orchestrator
        .register_model(LLMEntry::new("openai:broken", Arc::new(failing.clone())))
        .expect("register");
    let store = memory();

    orchestrator
        .invoke("Hi", request("thread-1", store.clone()))
        .await
        .expect("first turn");
    let before = orchestrator.get_state("123", "thread-1").expect("state");

    let broken = RequestContext::new("thread-1", "123", "openai:broken", store.clone());
    let err = orchestrator
        .invoke("Still there?", broken)
        .await
        .expect_err("upstream failure");
    assert!(matches!(err, CoreError::Upstream(_)));
    assert!(err.is_upstream());
    assert_eq!(failing.attempts(), 3);
    assert_eq!(orchestrator.get_state("123", "thread-1").expect("state"), before);
    assert_eq!(store.list("123").await.expect("list").len(), 2);
}

#[tokio::test]
async fn streamed_failure_is_reported_on_the_stream() {
    let orchestrator = orchestrator(base_config(), Arc::new(FailingLLM::new("down"))).await;
    let mut stream = orchestrator
        .stream("Hi", request("thread-1", memory()))
        .expect("stream");
    assert!(matches!(
        stream.next().await,
        Some(Err(CoreError::Upstream(_)))
    ));
    assert!(stream.next().await.is_none());
    assert!(matches!(
        orchestrator.get_state("123", "thread-1"),
        Err(CoreError::UnknownThread(_))
    ));
}

#[tokio::test]
async fn dropped_stream_persists_nothing() {
    let llm = ScriptedLLM::new(vec![FixedChatResponse::new("Hello there friend")]);
    let mut config = base_config();
    config.orchestrator.stream_buffer = 1;
    let orchestrator = orchestrator(config, Arc::new(llm.clone())).await;
    let store = memory();

    let mut stream = orchestrator
        .stream("Hi", request("thread-1", store.clone()))
        .expect("stream");
    assert_eq!(stream.next().await.expect("delta").expect("text"), "Hello ");
    drop(stream);
    tokio::task::yield_now().await;

    assert!(matches!(
        orchestrator.get_state("123", "thread-1"),
        Err(CoreError::UnknownThread(_))
    ));
    assert!(store.list("123").await.expect("list").is_empty());
}

#[tokio::test]
async fn get_state_is_stable_and_owner_scoped() {
    let orchestrator = orchestrator(
        base_config(),
        Arc::new(ScriptedLLM::new(vec![FixedChatResponse::new("Thanks!")])),
    )
    .await;
    orchestrator
        .invoke("Hello", request("thread-1", memory()))
        .await
        .expect("invoke");

    let first = orchestrator.get_state("123", "thread-1").expect("state");
    let second = orchestrator.get_state("123", "thread-1").expect("state");
    assert_eq!(first, second);
    assert!(matches!(
        orchestrator.get_state("456", "thread-1"),
        Err(CoreError::UnknownThread(_))
    ));
    assert!(matches!(
        orchestrator.get_state("123", "missing"),
        Err(CoreError::UnknownThread(_))
    ));
}

#[tokio::test]
async fn unknown_model_is_rejected_before_running() {
    let orchestrator = orchestrator(base_config(), Arc::new(ScriptedLLM::new(Vec::new()))).await;
    let request = RequestContext::new("thread-1", "123", "openai:missing", memory());
    assert!(matches!(
        orchestrator.invoke("Hi", request.clone()).await,
        Err(CoreError::UnknownModel(_))
    ));
    assert!(matches!(
        orchestrator.stream("Hi", request),
        Err(CoreError::UnknownModel(_))
    ));
    assert_eq!(orchestrator.models(), vec![MODEL.to_string()]);
}

#[tokio::test]
async fn tool_failures_become_tool_results() {
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::with_tool_calls(
            "",
            vec![
                llm_tool_call("call_1", "missing_tool", json!({})),
                llm_tool_call("call_2", "get_customer_info", json!({ "customer_id": "999" })),
                llm_tool_call("call_3", "get_customer_info", json!({ "customer_id": "456" })),
            ],
        ),
        FixedChatResponse::new("Sorry about that."),
    ]);
    let orchestrator = orchestrator(base_config(), Arc::new(llm)).await;
    orchestrator
        .invoke("Look people up", request("thread-1", memory()))
        .await
        .expect("invoke");

    let state = orchestrator.get_state("123", "thread-1").expect("state");
    let results = state
        .messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .map(|message| message.content.clone())
        .collect::<Vec<_>>();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], "Error: tool not found: missing_tool");
    assert_eq!(results[1], "Error: Customer not found.");
    assert!(results[2].contains("Bob Johnson"));
}

#[tokio::test]
async fn observer_sees_turn_events() {
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::with_tool_calls(
            "",
            vec![llm_tool_call(
                "call_1",
                "get_customer_info",
                json!({ "customer_id": "123" }),
            )],
        ),
        FixedChatResponse::new("Hi Alice."),
    ]);
    let observer = Arc::new(CollectingSink::default());
    let orchestrator =
        Orchestrator::new(base_config(), tools().await, None, Some(observer.clone()))
            .expect("orchestrator");
    orchestrator
        .register_model(LLMEntry::new(MODEL, Arc::new(llm)))
        .expect("register");
    orchestrator
        .invoke("Hello", request("thread-1", memory()))
        .await
        .expect("invoke");

    let events = observer.events();
    assert!(events.iter().any(|event| matches!(
        &event.kind,
        EventKind::ToolFinished { tool_name, success: true, .. } if tool_name == "get_customer_info"
    )));
    assert!(matches!(
        events.last().map(|event| &event.kind),
        Some(EventKind::TurnCompleted { message }) if message == "Hi Alice."
    ));
}

#[tokio::test]
async fn window_limits_history_sent_to_model() {
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::new("Nice to meet you."),
        FixedChatResponse::new("Sure."),
    ]);
    let mut config = base_config();
    config.window.max_messages = 1;
    let orchestrator = orchestrator(config, Arc::new(llm.clone())).await;
    let store = memory();
    for text in ["I'm Alice", "Remember that"] {
        orchestrator
            .invoke(text, request("thread-1", store.clone()))
            .await
            .expect("invoke");
    }
    let calls = llm.calls();
    assert_eq!(calls[1].messages.len(), 3);
    assert_eq!(calls[1].messages[2].content, "Remember that");
    assert_eq!(roles(&orchestrator, "thread-1").len(), 4);
}

#[tokio::test]
async fn jsonl_checkpoints_resume_across_restarts() {
    let temp = tempdir().expect("tempdir");
    let mut config = base_config();
    config.sessions = SessionsConfig {
        enabled: true,
        path: Some(temp.path().to_string_lossy().to_string()),
    };
    let store = memory();

    let first = orchestrator(
        config.clone(),
        Arc::new(ScriptedLLM::new(vec![FixedChatResponse::new("Hi Alice.")])),
    )
    .await;
    first
        .invoke("My name is Alice", request("thread-1", store.clone()))
        .await
        .expect("first turn");
    drop(first);

    let llm = ScriptedLLM::new(vec![FixedChatResponse::new("You are Alice.")]);
    let second = orchestrator(config, Arc::new(llm.clone())).await;
    let reply = second
        .invoke("Who am I?", request("thread-1", store))
        .await
        .expect("second turn");
    assert_eq!(reply, "You are Alice.");
    assert!(
        llm.calls()[0]
            .messages
            .iter()
            .any(|message| message.content == "My name is Alice")
    );
    assert_eq!(roles(&second, "thread-1").len(), 4);
    assert_eq!(second.list_threads().expect("threads")[0].message_count, 4);
    assert!(second.delete_thread("thread-1").await.expect("delete"));
}

#[tokio::test]
async fn repeated_turns_store_each_memory_once() {
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::new("Noted, pizza it is."),
        FixedChatResponse::new("Shipping takes 2-3 days."),
    ]);
    let orchestrator = orchestrator(base_config(), Arc::new(llm)).await;
    let store = memory();
    for text in ["I love pizza", "How long is shipping?"] {
        orchestrator
            .invoke(text, request("thread-1", store.clone()))
            .await
            .expect("invoke");
    }

    let memories = store
        .list("123")
        .await
        .expect("list")
        .into_iter()
        .map(|record| record.memory)
        .collect::<Vec<_>>();
    assert_eq!(
        memories,
        vec![
            "I love pizza",
            "Noted, pizza it is.",
            "How long is shipping?",
            "Shipping takes 2-3 days.",
        ]
    );
}

/// Sleeps, then records its name as finished and echoes it back.
#[derive(Debug)]
struct DelayedTool {
    name: &'static str,
    delay: Duration,
    finished: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tool for DelayedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Echoes its own name after a delay."
    }

    fn args_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _ctx: &ToolContext, _args: Value) -> Result<String, ToolError> {
        tokio::time::sleep(self.delay).await;
        self.finished.lock().push(self.name.to_string());
        Ok(self.name.to_string())
    }
}

/// Signals when it starts, then takes long enough to be cancelled mid-call.
#[derive(Debug, Default)]
struct SlowTool {
    started: Notify,
    completed: AtomicBool,
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow_lookup"
    }

    fn description(&self) -> &str {
        "Looks something up slowly."
    }

    fn args_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _ctx: &ToolContext, _args: Value) -> Result<String, ToolError> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.completed.store(true, Ordering::SeqCst);
        Ok("found it".to_string())
    }
}

async fn orchestrator_with_tools(
    tools: Vec<Arc<dyn Tool>>,
    llm: Arc<dyn LLMProvider>,
) -> Orchestrator {
    let registry = ToolRegistry::builder()
        .register_all(tools)
        .build()
        .expect("tools");
    let orchestrator = Orchestrator::new(base_config(), registry, None, None).expect("orchestrator");
    orchestrator
        .register_model(LLMEntry::new(MODEL, llm))
        .expect("register model");
    orchestrator
}

#[tokio::test]
async fn parallel_tool_results_follow_call_order() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(DelayedTool {
            name: "first",
            delay: Duration::from_millis(80),
            finished: finished.clone(),
        }),
        Arc::new(DelayedTool {
            name: "second",
            delay: Duration::ZERO,
            finished: finished.clone(),
        }),
    ];
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::with_tool_calls(
            "",
            vec![
                llm_tool_call("call_1", "first", json!({})),
                llm_tool_call("call_2", "second", json!({})),
            ],
        ),
        FixedChatResponse::new("Both done."),
    ]);
    let orchestrator = orchestrator_with_tools(tools, Arc::new(llm)).await;

    orchestrator
        .invoke("Run both", request("thread-1", memory()))
        .await
        .expect("invoke");

    assert_eq!(*finished.lock(), vec!["second", "first"]);
    let state = orchestrator.get_state("123", "thread-1").expect("state");
    let results = state
        .messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .map(|message| {
            (
                message.tool_call_id.clone().unwrap_or_default(),
                message.content.clone(),
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        results,
        vec![
            ("call_1".to_string(), "first".to_string()),
            ("call_2".to_string(), "second".to_string()),
        ]
    );
}

#[tokio::test]
async fn dropping_stream_during_tool_dispatch_commits_nothing() {
    let slow = Arc::new(SlowTool::default());
    let llm = ScriptedLLM::new(vec![
        FixedChatResponse::with_tool_calls(
            "",
            vec![llm_tool_call("call_1", "slow_lookup", json!({}))],
        ),
        FixedChatResponse::new("Here you go."),
    ]);
    let tools: Vec<Arc<dyn Tool>> = vec![slow.clone()];
    let orchestrator = orchestrator_with_tools(tools, Arc::new(llm.clone())).await;
    let store = memory();

    let stream = orchestrator
        .stream("Look it up", request("thread-1", store.clone()))
        .expect("stream");
    slow.started.notified().await;
    drop(stream);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!slow.completed.load(Ordering::SeqCst));
    assert_eq!(llm.calls().len(), 1);
    assert!(matches!(
        orchestrator.get_state("123", "thread-1"),
        Err(CoreError::UnknownThread(_))
    ));
    assert!(store.list("123").await.expect("list").is_empty());
}

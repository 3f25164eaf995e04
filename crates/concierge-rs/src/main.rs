use anyhow::{Context, bail};
use autoagents_llm::LLMProvider;
use autoagents_llm::backends::openai::OpenAI;
use autoagents_llm::builder::LLMBuilder;
use clap::{Parser, Subcommand};
use concierge_rs::config::{ConciergeConfig, ModelConfig};
use concierge_rs::core::{LLMEntry, Orchestrator, resolve_storage_root};
use concierge_rs::init_logging;
use concierge_rs::memory::{
    Embedder, FileMemoryStore, InMemoryStore, LlmEmbedder, MemoryStore, RetrievalGateway,
};
use concierge_rs::tools::{
    BuiltinSources, FormRegistry, RequestContext, StaticCustomerDirectory, ToolRegistry,
    builtin_tool_registry, default_knowledge_base,
};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "concierge", version, about = "Conversational assistant runtime")]
struct Cli {
    /// Path to a config file; layered lookup from the cwd otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Model id in `provider:model` form
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true, default_value = "123")]
    user: String,
    /// Thread to continue; a fresh one is created when omitted
    #[arg(long, global = true)]
    thread: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat with streamed replies
    Chat,
    /// Send one message and print the reply
    Ask {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print the persisted state of a thread as JSON
    State,
}

/// Entry point for the Concierge CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.logging);
    info!(
        "starting concierge (config_set={}, model_set={}, thread_set={})",
        cli.config.is_some(),
        cli.model.is_some(),
        cli.thread.is_some()
    );

    if let Command::State = cli.command {
        let Some(thread_id) = cli.thread.as_deref() else {
            bail!("--thread is required for the state command");
        };
        let tools = ToolRegistry::builder()
            .build()
            .context("failed to build tool registry")?;
        let orchestrator = Orchestrator::new(config, tools, None, None)
            .context("failed to create orchestrator")?;
        let state = orchestrator
            .get_state(&cli.user, thread_id)
            .context("failed to load thread state")?;
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let api_key =
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is required to run concierge")?;
    let model = cli
        .model
        .clone()
        .unwrap_or_else(|| config.model.default.clone());

    let embedder: Arc<dyn Embedder> = Arc::new(LlmEmbedder::new(build_openai(
        &api_key,
        &config.retrieval.embeddings_model,
        None,
    )?));
    let memory = build_memory_store(&config, embedder.clone())?;
    let knowledge = RetrievalGateway::build(
        default_knowledge_base(),
        embedder,
        config.retrieval.threshold,
        config.retrieval.top_k,
    )
    .await
    .context("failed to embed knowledge base")?;
    let tools = builtin_tool_registry(&BuiltinSources {
        customers: Arc::new(StaticCustomerDirectory::sample()),
        knowledge: Arc::new(knowledge),
        forms: Arc::new(FormRegistry::from_config(&config.forms)),
    })
    .context("failed to build tool registry")?;

    let model_config = config.model.clone();
    let orchestrator =
        Orchestrator::new(config, tools, None, None).context("failed to create orchestrator")?;
    register_models(&orchestrator, &api_key, &model_config, &model)?;

    let thread_id = cli
        .thread
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request = RequestContext::new(thread_id.clone(), cli.user.clone(), model, memory);
    match cli.command {
        Command::Ask { text } => {
            let reply = orchestrator
                .invoke(text.join(" "), request)
                .await
                .context("turn failed")?;
            println!("{reply}");
        }
        Command::Chat => run_chat(&orchestrator, request).await?,
        Command::State => {}
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ConciergeConfig> {
    if let Some(path) = path {
        return ConciergeConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    let layered = ConciergeConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// Build an OpenAI provider from a `openai:model` id.
fn build_openai(
    api_key: &str,
    model_id: &str,
    sampling: Option<&ModelConfig>,
) -> anyhow::Result<Arc<dyn LLMProvider>> {
    let Some(("openai", model_name)) = model_id.split_once(':') else {
        bail!("unsupported model id: {model_id}");
    };
    let mut builder = LLMBuilder::<OpenAI>::new().api_key(api_key).model(model_name);
    if let Some(sampling) = sampling {
        builder = builder
            .temperature(sampling.temperature)
            .max_tokens(sampling.max_tokens);
    }
    let llm: Arc<dyn LLMProvider> = builder
        .build()
        .context("failed to build OpenAI LLM provider")?;
    Ok(llm)
}

fn register_models(
    orchestrator: &Orchestrator,
    api_key: &str,
    config: &ModelConfig,
    selected: &str,
) -> anyhow::Result<()> {
    let mut ids = config.available.clone();
    if !ids.iter().any(|id| id == selected) {
        ids.push(selected.to_string());
    }
    for id in ids {
        if !id.starts_with("openai:") {
            warn!("skipping model without a configured backend (model={})", id);
            continue;
        }
        let llm = build_openai(api_key, &id, Some(config))?;
        orchestrator.register_model(LLMEntry::new(id, llm))?;
    }
    if !orchestrator.models().iter().any(|id| id == selected) {
        bail!("model {selected} is not available");
    }
    Ok(())
}

fn build_memory_store(
    config: &ConciergeConfig,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<Arc<dyn MemoryStore>> {
    match config.memory.path.as_deref() {
        Some(path) => {
            let root = resolve_storage_root(Some(path), "memory")?;
            let store = FileMemoryStore::new(root, embedder)
                .context("failed to create memory store")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryStore::new(embedder))),
    }
}

async fn run_chat(orchestrator: &Orchestrator, request: RequestContext) -> anyhow::Result<()> {
    println!("thread {} (type \"exit\" to quit)", request.thread_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        let mut reply = orchestrator.stream(line, request.clone())?;
        while let Some(chunk) = reply.next().await {
            match chunk {
                Ok(delta) => {
                    print!("{delta}");
                    std::io::stdout().flush()?;
                }
                Err(err) => {
                    eprintln!("\nerror: {err}");
                    break;
                }
            }
        }
        println!();
    }
    Ok(())
}

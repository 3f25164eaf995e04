//! Long-term memory tools scoped to the requesting user.

use crate::builtins::utils::{input_schema, memory_failure, parse_args, require_text};
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use autoagents_core::tool::ToolInputT;
use autoagents_derive::ToolInput;
use concierge_rs_protocol::ToolError;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Serialize, Deserialize, ToolInput)]
struct SaveMemoryArgs {
    #[input(description = "Context of the conversation to save.")]
    context: String,
}

/// Stores a note in the user's memory.
#[derive(Debug, Default)]
pub struct SaveMemoryTool;

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Store information between conversations to memory to build a comprehensive understanding of the user."
    }

    fn args_schema(&self) -> Value {
        input_schema::<SaveMemoryArgs>()
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        let input: SaveMemoryArgs = parse_args(args)?;
        require_text("context", &input.context)?;
        let records = ctx
            .memory()
            .save(&input.context, ctx.user_id())
            .await
            .map_err(memory_failure)?;
        info!(
            "saved memory (user_id={}, records={})",
            ctx.user_id(),
            records.len()
        );
        let saved = records
            .iter()
            .map(|record| json!({ "id": record.id, "memory": record.memory }))
            .collect::<Vec<_>>();
        Ok(format!("Memory saved: {}", Value::Array(saved)))
    }
}

#[derive(Debug, Serialize, Deserialize, ToolInput)]
struct SearchMemoryArgs {
    #[input(description = "Query to retrieve from memory.")]
    query: String,
}

/// Recalls relevant memories of the user.
#[derive(Debug, Default)]
pub struct SearchMemoryTool;

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Search memory for relevant information about the user."
    }

    fn args_schema(&self) -> Value {
        input_schema::<SearchMemoryArgs>()
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        let input: SearchMemoryArgs = parse_args(args)?;
        require_text("query", &input.query)?;
        let memories = ctx
            .memory()
            .recall(&input.query, ctx.user_id(), ctx.services.recall_limit)
            .await
            .map_err(memory_failure)?;
        if memories.is_empty() {
            return Ok("No relevant memories found.".to_string());
        }
        Ok(memories
            .into_iter()
            .map(|record| record.memory)
            .collect::<Vec<_>>()
            .join(".\n"))
    }
}

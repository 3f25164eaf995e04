//! Tool trait and the metadata advertised to the model.

use crate::context::ToolContext;
use async_trait::async_trait;
use concierge_rs_protocol::ToolError;
use serde_json::Value;
use std::fmt::Debug;

/// Name, description and argument schema of a tool, as bound to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for tool arguments.
    pub args_schema: Value,
}

/// A named capability the model may invoke during a turn.
///
/// Tools return plain text; the orchestrator wraps it into a tool-result
/// message answering the originating call.
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn args_schema(&self) -> Value;

    /// Whether calls may run concurrently with other calls of the same batch.
    fn supports_parallel(&self) -> bool {
        true
    }

    /// Invoke the tool with the request context and model-provided arguments.
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<String, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            args_schema: self.args_schema(),
        }
    }
}

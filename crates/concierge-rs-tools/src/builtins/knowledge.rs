//! Company knowledge base search backed by the retrieval gateway.

use crate::builtins::utils::{input_schema, memory_failure, parse_args, require_text};
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use autoagents_core::tool::ToolInputT;
use autoagents_derive::ToolInput;
use concierge_rs_memory::RetrievalGateway;
use concierge_rs_protocol::ToolError;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Company policy documents shipped with the runtime.
pub fn default_knowledge_base() -> Vec<String> {
    [
        "Our support team is available 24/7 to assist with your inquiries.",
        "We offer a 30-day return policy for unused and unopened items.",
        "Shipping is free for orders above $50.",
        "Payment options include credit card, PayPal, and Apple Pay.",
        "For technical issues, please contact techsupport@company.com.",
        "Gift cards can be purchased online and are delivered via email.",
        "To reset your password, click on 'Forgot Password' on the login page.",
        "Our physical stores are open from 9 AM to 9 PM, Monday through Saturday.",
        "Shipping takes 2-3 days.",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Serialize, Deserialize, ToolInput)]
struct KnowledgeBaseArgs {
    #[input(description = "query to look up in retriever")]
    query: String,
}

pub struct KnowledgeBaseTool {
    gateway: Arc<RetrievalGateway>,
}

impl KnowledgeBaseTool {
    pub fn new(gateway: Arc<RetrievalGateway>) -> Self {
        Self { gateway }
    }
}

impl fmt::Debug for KnowledgeBaseTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KnowledgeBaseTool(documents={})", self.gateway.len())
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "company_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search and return all information about the company."
    }

    fn args_schema(&self) -> Value {
        input_schema::<KnowledgeBaseArgs>()
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        let input: KnowledgeBaseArgs = parse_args(args)?;
        require_text("query", &input.query)?;
        let documents = self
            .gateway
            .search(&input.query)
            .await
            .map_err(memory_failure)?;
        debug!("knowledge base answered (documents={})", documents.len());
        if documents.is_empty() {
            return Ok("No relevant company information found.".to_string());
        }
        Ok(documents
            .into_iter()
            .map(|document| document.content)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

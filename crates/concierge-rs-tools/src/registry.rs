//! Ordered, immutable registry of the tools bound to the agent.

use crate::context::ToolContext;
use crate::tool::{Tool, ToolSpec};
use concierge_rs_protocol::{ToolCall, ToolError};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Errors raised while assembling a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
    #[error("tool name cannot be empty")]
    EmptyName,
}

/// Tools in registration order with a name index.
///
/// The set is fixed once built; cloning shares the same tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Arc<Vec<Arc<dyn Tool>>>,
    index: Arc<HashMap<String, usize>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Fetch a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index
            .get(name)
            .and_then(|position| self.tools.get(*position))
            .cloned()
    }

    /// Tool names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| tool.name().to_string())
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.iter().cloned().collect()
    }

    /// Specs for binding to the model, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve `call` by name and run it.
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<String, ToolError> {
        let Some(tool) = self.get(&call.name) else {
            warn!("model requested unknown tool (name={})", call.name);
            return Err(ToolError::ToolNotFound(call.name.clone()));
        };
        debug!("executing tool (name={}, call_id={})", call.name, call.id);
        tool.call(ctx, call.arguments.clone()).await
    }
}

/// Collects tools before freezing them into a [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        debug!("registering tool (name={})", tool.name());
        self.tools.push(tool);
        self
    }

    pub fn register_all(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        for tool in tools {
            self = self.register(tool);
        }
        self
    }

    /// Freeze the registry; names must be non-empty and unique.
    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut index = HashMap::with_capacity(self.tools.len());
        for (position, tool) in self.tools.iter().enumerate() {
            let name = tool.name();
            if name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if index.insert(name.to_string(), position).is_some() {
                return Err(RegistryError::DuplicateTool(name.to_string()));
            }
        }
        Ok(ToolRegistry {
            tools: Arc::new(self.tools),
            index: Arc::new(index),
        })
    }
}

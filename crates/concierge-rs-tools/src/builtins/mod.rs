//! Built-in tools of the customer support agent.

mod customer;
mod form;
mod knowledge;
mod memory;
mod utils;

pub use customer::{
    CustomerDirectory, CustomerRecord, GetCustomerInfoTool, StaticCustomerDirectory,
};
pub use form::{FORM_SUBMITTED, FormInfoTool, SubmitFormTool};
pub use knowledge::{KnowledgeBaseTool, default_knowledge_base};
pub use memory::{SaveMemoryTool, SearchMemoryTool};

use crate::forms::FormRegistry;
use crate::registry::{RegistryError, ToolRegistry};
use concierge_rs_memory::RetrievalGateway;
use log::info;
use std::sync::Arc;

/// Data sources behind the built-in tools.
#[derive(Clone)]
pub struct BuiltinSources {
    pub customers: Arc<dyn CustomerDirectory>,
    pub knowledge: Arc<RetrievalGateway>,
    pub forms: Arc<FormRegistry>,
}

/// Registry with every built-in tool: memory tools, knowledge base, customer
/// lookup, one info tool per form, then `submit_form`.
pub fn builtin_tool_registry(sources: &BuiltinSources) -> Result<ToolRegistry, RegistryError> {
    let mut builder = ToolRegistry::builder()
        .register(Arc::new(SaveMemoryTool))
        .register(Arc::new(SearchMemoryTool))
        .register(Arc::new(KnowledgeBaseTool::new(sources.knowledge.clone())))
        .register(Arc::new(GetCustomerInfoTool::new(sources.customers.clone())));
    for form in sources.forms.iter() {
        builder = builder.register(Arc::new(FormInfoTool::new(form.clone())));
    }
    let registry = builder
        .register(Arc::new(SubmitFormTool::new(sources.forms.clone())))
        .build()?;
    info!("built-in tools registered (count={})", registry.len());
    Ok(registry)
}

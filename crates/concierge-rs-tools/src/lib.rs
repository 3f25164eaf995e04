//! Tooling interfaces, form collection, and built-in tools for Concierge.

pub mod builtins;
pub mod context;
pub mod forms;
pub mod registry;
pub mod tool;

/// Built-in tool registry and data sources.
pub use builtins::{
    BuiltinSources, CustomerDirectory, CustomerRecord, StaticCustomerDirectory,
    builtin_tool_registry, default_knowledge_base,
};
/// Request and tool execution context types.
pub use context::{RequestContext, ToolContext, TurnServices};
/// Form definitions, validation and extraction.
pub use forms::{
    FORM_INSTRUCTIONS, FieldSetValidator, FormDefinition, FormExtractor, FormInstructions,
    FormRegistry, StructuredFormRecord,
};
/// Tool registry type.
pub use registry::{RegistryError, ToolRegistry, ToolRegistryBuilder};
/// Tool trait and spec type.
pub use tool::{Tool, ToolSpec};

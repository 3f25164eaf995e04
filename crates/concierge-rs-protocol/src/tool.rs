/// Errors returned by tools and surfaced to the model as tool results.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool name was not found in registry.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// Requested entity does not exist in the backing data source.
    #[error("{0}")]
    NotFound(String),
    /// Submitted form name is not registered.
    #[error("Form `{0}` not found.")]
    FormNotFound(String),
    /// Submitted form data could not be structured into the form's fields.
    #[error("could not parse form data: {0}")]
    FormParse(String),
    /// Tool received invalid arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

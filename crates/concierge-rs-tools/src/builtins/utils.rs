//! Helpers shared by built-in tools.

use autoagents_core::tool::ToolInputT;
use concierge_rs_protocol::ToolError;
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Parse JSON args into a typed struct for tool calls.
pub(super) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

/// Argument schema generated by the `ToolInput` derive.
pub(super) fn input_schema<T: ToolInputT>() -> Value {
    serde_json::from_str(T::io_schema()).unwrap_or_else(|err| {
        warn!("invalid generated tool schema (err={})", err);
        empty_schema()
    })
}

pub(super) fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Reject blank string arguments.
pub(super) fn require_text(name: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::InvalidArguments(format!(
            "{name} cannot be empty"
        )));
    }
    Ok(())
}

pub(super) fn memory_failure(err: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed(err.to_string())
}

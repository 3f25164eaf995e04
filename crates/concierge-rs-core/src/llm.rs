//! Conversion between conversation messages and provider chat types.

use autoagents_llm::chat::{ChatMessage, ChatRole, MessageType, Tool as LlmTool};
use autoagents_llm::{FunctionCall, ToolCall as LlmToolCall};
use concierge_rs_protocol::{Message, Role, ToolCall};
use concierge_rs_tools::ToolSpec;
use log::warn;
use serde_json::{Value, json};
use std::collections::HashMap;

pub(crate) const TOOL_RESULT_PLACEHOLDER: &str = "[tool output omitted]";

/// Provider messages for a prompt, with every tool request paired to a result.
pub(crate) fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    ensure_tool_results(messages.iter().map(to_chat_message).collect())
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => text(ChatRole::System, &message.content),
        Role::Human => text(ChatRole::User, &message.content),
        Role::Ai if message.has_tool_calls() => ChatMessage {
            role: ChatRole::Assistant,
            message_type: MessageType::ToolUse(
                message.tool_calls.iter().map(to_llm_tool_call).collect(),
            ),
            content: message.content.clone(),
        },
        Role::Ai => text(ChatRole::Assistant, &message.content),
        Role::Tool => ChatMessage {
            role: ChatRole::Tool,
            message_type: MessageType::ToolResult(vec![LlmToolCall {
                id: message.tool_call_id.clone().unwrap_or_default(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: message.name.clone().unwrap_or_default(),
                    arguments: message.content.clone(),
                },
            }]),
            content: String::new(),
        },
    }
}

fn text(role: ChatRole, content: &str) -> ChatMessage {
    ChatMessage {
        role,
        message_type: MessageType::Text,
        content: content.to_string(),
    }
}

fn to_llm_tool_call(call: &ToolCall) -> LlmToolCall {
    LlmToolCall {
        id: call.id.clone(),
        call_type: "function".to_string(),
        function: FunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.to_string(),
        },
    }
}

/// Convert a provider tool call, decoding its JSON argument string.
///
/// Empty arguments become an empty object; undecodable arguments are kept as
/// a string so the tool reports the problem back to the model.
pub(crate) fn from_llm_tool_call(call: &LlmToolCall) -> ToolCall {
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        json!({})
    } else {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    };
    ToolCall {
        id: call.id.clone(),
        name: call.function.name.clone(),
        arguments,
    }
}

/// Provider tool definitions for the registered tools.
pub(crate) fn to_llm_tools(specs: &[ToolSpec]) -> Vec<LlmTool> {
    specs
        .iter()
        .filter_map(|spec| {
            serde_json::from_value(json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.args_schema,
                },
            }))
            .map_err(|err| warn!("skipping tool definition (name={}, err={})", spec.name, err))
            .ok()
        })
        .collect()
}

/// Place each call's result directly after the requesting message.
///
/// Results are grouped into one tool message per request; requests without a
/// recorded result get a placeholder, and orphaned results are dropped.
pub(crate) fn ensure_tool_results(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut result_map = collect_tool_results(&messages);
    let mut output = Vec::with_capacity(messages.len());

    for message in messages {
        match &message.message_type {
            MessageType::ToolUse(calls) => {
                let resolved = calls
                    .iter()
                    .map(|call| {
                        result_map
                            .remove(&call.id)
                            .unwrap_or_else(|| placeholder_tool_result(call))
                    })
                    .collect::<Vec<_>>();
                output.push(message);
                if !resolved.is_empty() {
                    output.push(ChatMessage {
                        role: ChatRole::Tool,
                        message_type: MessageType::ToolResult(resolved),
                        content: String::new(),
                    });
                }
            }
            MessageType::ToolResult(_) => {}
            _ => output.push(message),
        }
    }

    output
}

fn placeholder_tool_result(call: &LlmToolCall) -> LlmToolCall {
    LlmToolCall {
        id: call.id.clone(),
        call_type: call.call_type.clone(),
        function: FunctionCall {
            name: call.function.name.clone(),
            arguments: TOOL_RESULT_PLACEHOLDER.to_string(),
        },
    }
}

fn collect_tool_results(messages: &[ChatMessage]) -> HashMap<String, LlmToolCall> {
    let mut results = HashMap::new();
    for message in messages {
        if let MessageType::ToolResult(calls) = &message.message_type {
            for call in calls {
                results
                    .entry(call.id.clone())
                    .or_insert_with(|| call.clone());
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "search_memory".to_string(),
            arguments: json!({ "query": "pizza" }),
        }
    }

    fn result_ids(message: &ChatMessage) -> Vec<(String, String)> {
        match &message.message_type {
            MessageType::ToolResult(calls) => calls
                .iter()
                .map(|call| (call.id.clone(), call.function.arguments.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn roles_map_onto_provider_roles() {
        let first = call("a");
        let chat = to_chat_messages(&[
            Message::system("rules"),
            Message::human("hi"),
            Message::ai_with_tool_calls("", vec![first.clone()]),
            Message::tool_result(&first, "pizza"),
            Message::ai("You like pizza."),
        ]);
        let roles = chat
            .iter()
            .map(|message| message.role.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::Tool,
                ChatRole::Assistant,
            ]
        );
        assert_eq!(
            result_ids(&chat[3]),
            vec![("a".to_string(), "pizza".to_string())]
        );
    }

    #[test]
    fn parallel_results_are_grouped_after_request() {
        let first = call("a");
        let second = call("b");
        let chat = to_chat_messages(&[
            Message::human("hi"),
            Message::ai_with_tool_calls("", vec![first.clone(), second.clone()]),
            Message::tool_result(&first, "one"),
            Message::tool_result(&second, "two"),
        ]);
        assert_eq!(chat.len(), 3);
        assert_eq!(
            result_ids(&chat[2]),
            vec![
                ("a".to_string(), "one".to_string()),
                ("b".to_string(), "two".to_string()),
            ]
        );
    }

    #[test]
    fn missing_result_gets_placeholder() {
        let chat = to_chat_messages(&[
            Message::human("hi"),
            Message::ai_with_tool_calls("", vec![call("a")]),
        ]);
        assert_eq!(
            result_ids(&chat[2]),
            vec![("a".to_string(), TOOL_RESULT_PLACEHOLDER.to_string())]
        );
    }

    #[test]
    fn orphaned_result_is_dropped() {
        let chat = to_chat_messages(&[
            Message::human("hi"),
            Message::tool_result(&call("a"), "stale"),
            Message::ai("hello"),
        ]);
        assert_eq!(chat.len(), 2);
    }

    #[test]
    fn provider_arguments_are_decoded() {
        let decoded = from_llm_tool_call(&LlmToolCall {
            id: "a".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "get_customer_info".to_string(),
                arguments: "{\"customer_id\":\"123\"}".to_string(),
            },
        });
        assert_eq!(decoded.arguments, json!({ "customer_id": "123" }));

        let empty = from_llm_tool_call(&LlmToolCall {
            id: "b".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "noop".to_string(),
                arguments: String::new(),
            },
        });
        assert_eq!(empty.arguments, json!({}));

        let broken = from_llm_tool_call(&LlmToolCall {
            id: "c".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "noop".to_string(),
                arguments: "{not json".to_string(),
            },
        });
        assert_eq!(broken.arguments, json!("{not json"));
    }

    #[test]
    fn tool_specs_become_function_tools() {
        let tools = to_llm_tools(&[ToolSpec {
            name: "search_memory".to_string(),
            description: "Search memories".to_string(),
            args_schema: json!({ "type": "object", "properties": {} }),
        }]);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "search_memory");
    }
}

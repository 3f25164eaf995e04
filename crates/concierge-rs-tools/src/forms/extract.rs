//! Model-backed extraction of free-text form data into a structured record.

use super::{FormDefinition, RESERVED_KEYS, StructuredFormRecord};
use crate::context::ToolContext;
use autoagents_llm::chat::{
    ChatMessage, ChatProvider, ChatRole, MessageType, StreamChunk, StructuredOutputFormat,
};
use concierge_rs_protocol::{EventKind, NodeId, TokenContent, ToolError};
use futures_util::StreamExt;
use log::{debug, warn};
use serde_json::{Map, Value, json};

const SUBMIT_FORM_PROMPT: &str =
    "You're an expert in data transformation. Wrap the user input into `json` tags\n";

/// Turns collected form data into a [`StructuredFormRecord`] using the turn's model.
///
/// Streaming turns forward the extraction tokens tagged with the `Tools`
/// node so they never reach the conversation output.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormExtractor;

impl FormExtractor {
    pub async fn extract(
        &self,
        ctx: &ToolContext,
        form: &FormDefinition,
        form_data: &str,
    ) -> Result<StructuredFormRecord, ToolError> {
        let schema = record_schema(form);
        let messages = vec![
            text_message(
                ChatRole::System,
                format!("{SUBMIT_FORM_PROMPT}{}", format_instructions(&schema)),
            ),
            text_message(ChatRole::System, format!("Today is {}", ctx.services.today)),
            text_message(
                ChatRole::User,
                format!(
                    "User ID: {}.\nForm ID: {}.\nForm data: {}",
                    ctx.user_id(),
                    form.name,
                    form_data
                ),
            ),
        ];
        let output = structured_output(&form.name, schema);
        let raw = if ctx.is_streaming() {
            self.stream_completion(ctx, &messages, output).await?
        } else {
            ctx.services
                .llm
                .chat_with_tools(&messages, None, output)
                .await
                .map_err(extraction_failed)?
                .text()
                .unwrap_or_default()
        };
        debug!(
            "form extraction returned (form={}, chars={})",
            form.name,
            raw.len()
        );
        parse_record(form, ctx.user_id(), &raw)
    }

    async fn stream_completion(
        &self,
        ctx: &ToolContext,
        messages: &[ChatMessage],
        output: Option<StructuredOutputFormat>,
    ) -> Result<String, ToolError> {
        let mut stream = ctx
            .services
            .llm
            .chat_stream_with_tools(messages, None, output)
            .await
            .map_err(extraction_failed)?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            if let StreamChunk::Text(delta) = chunk.map_err(extraction_failed)? {
                if delta.is_empty() {
                    continue;
                }
                text.push_str(&delta);
                ctx.emit(
                    NodeId::Tools,
                    EventKind::ModelToken {
                        content: TokenContent::Text(delta),
                    },
                )
                .await
                .map_err(|err| ToolError::ExecutionFailed(err.to_string()))?;
            }
        }
        Ok(text)
    }
}

fn extraction_failed(err: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed(format!("form extraction failed: {err}"))
}

fn text_message(role: ChatRole, content: String) -> ChatMessage {
    ChatMessage {
        role,
        message_type: MessageType::Text,
        content,
    }
}

/// JSON schema of the record: every declared field plus the reserved keys,
/// all required strings.
pub(crate) fn record_schema(form: &FormDefinition) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut keys = form.fields.iter().map(String::as_str).collect::<Vec<_>>();
    keys.extend_from_slice(&RESERVED_KEYS);
    for key in keys {
        properties.insert(
            key.to_string(),
            json!({ "title": title_case(key), "type": "string" }),
        );
        required.push(Value::String(key.to_string()));
    }
    json!({
        "title": "FormParser",
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_instructions(schema: &Value) -> String {
    format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
         As an example, for the schema {{\"properties\": {{\"foo\": {{\"type\": \"string\"}}}}, \"required\": [\"foo\"]}}\n\
         the object {{\"foo\": \"bar\"}} is a well-formatted instance of the schema.\n\n\
         Here is the output schema:\n```\n{schema}\n```"
    )
}

fn structured_output(form_name: &str, schema: Value) -> Option<StructuredOutputFormat> {
    serde_json::from_value(json!({
        "name": format!("{form_name}_record"),
        "description": "Form data collected from the user",
        "schema": schema,
        "strict": true,
    }))
    .map_err(|err| warn!("structured output unavailable (form={}, err={})", form_name, err))
    .ok()
}

/// Strip a ```json fence or surrounding prose and return the JSON object text.
fn json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```") {
        let body = &trimmed[start + 3..];
        let body = body.strip_prefix("json").unwrap_or(body);
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Validate the model output against the form's field set.
///
/// `user_id` and `form_name` always come from the request, never from the
/// model output.
pub(crate) fn parse_record(
    form: &FormDefinition,
    user_id: &str,
    raw: &str,
) -> Result<StructuredFormRecord, ToolError> {
    let value: Value = serde_json::from_str(json_payload(raw))
        .map_err(|err| ToolError::FormParse(format!("output is not valid JSON: {err}")))?;
    let Value::Object(values) = value else {
        return Err(ToolError::FormParse(
            "output is not a JSON object".to_string(),
        ));
    };
    let fields = form.validator().validate(&values)?;
    Ok(StructuredFormRecord {
        form_name: form.name.clone(),
        user_id: user_id.to_string(),
        fields,
    })
}

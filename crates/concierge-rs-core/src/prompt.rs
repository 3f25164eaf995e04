//! System prompt assembly for Agent node calls.

use concierge_rs_protocol::Message;

/// Default instructions of the support agent.
pub const AGENT_PROMPT: &str = "You are a helpful and empathetic customer support agent with advanced long-term memory capabilities.
Use the provided tools to for contextual information to assist the user's queries.
When searching, be persistent. Expand your query bounds if the first search returns no results.
Base all responses solely on retrieved context.
If no answer is found, state that you don't know.
Keep responses concise and very brief. DO NOT fabricate answers.
Utilize the available memory tools to store and retrieve important details that will help you better attend to the user's needs and understand their context.";

/// Prepends the system prompt and the current date to a windowed history.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PromptBuilder {
    /// `None` falls back to [`AGENT_PROMPT`].
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.unwrap_or_else(|| AGENT_PROMPT.to_string()),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Messages sent to the model for one Agent call.
    pub fn build(&self, today: &str, history: Vec<Message>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.push(Message::system(format!("Today is {today}")));
        messages.extend(history);
        messages
    }
}

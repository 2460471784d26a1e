//! Model provider abstraction: chat messages, tool calls, and the
//! [`LlmClient`] trait implemented by the Mistral backend.

mod mistral;

pub use mistral::MistralClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request to model provider failed: {0}")]
    Request(String),

    #[error("Model provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Could not parse model response: {0}")]
    Parse(String),
}

/// Message roles in the chat protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the conversation sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name, set on `Role::Tool` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// A tool-result message correlated to the originating call.
    pub fn tool_result(call_id: impl Into<String>, name: impl Into<String>, content: String) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,

    /// Always "function"; carried so echoed assistant messages round-trip.
    #[serde(rename = "type", default = "function_call_type")]
    pub kind: String,

    pub function: ToolCallFunction,
}

fn function_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,

    /// JSON-encoded argument map. Some providers send a string, others an
    /// object; both are accepted.
    pub arguments: Value,
}

impl ToolCall {
    /// Decode the argument map, tolerating string-encoded JSON.
    pub fn args(&self) -> Value {
        match &self.function.arguments {
            Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
            other => other.clone(),
        }
    }
}

/// Provider response: final prose and/or requested tool calls.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion call. `tools` carries the function schemas offered to
    /// the model; pass `None` to force a plain-text response.
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_args_accepts_string_encoding() {
        let call = ToolCall {
            id: "c1".to_string(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: "filter_data".to_string(),
                arguments: json!("{\"conditions\": \"age > 30\"}"),
            },
        };
        assert_eq!(call.args()["conditions"], json!("age > 30"));
    }

    #[test]
    fn tool_call_args_accepts_object_encoding() {
        let call = ToolCall {
            id: "c1".to_string(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: "describe_data".to_string(),
                arguments: json!({}),
            },
        };
        assert_eq!(call.args(), json!({}));
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }
}

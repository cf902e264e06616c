use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

const TOOL_CALL_KIND_FUNCTION: &str = "function";

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::plain(ROLE_SYSTEM, content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain(ROLE_USER, content)
    }

    pub fn assistant(content: &str, tool_calls: Vec<ChatToolCall>) -> Self {
        Self {
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            ..Self::plain(ROLE_ASSISTANT, content)
        }
    }

    pub fn tool_result(call_id: &str, tool_name: &str, content: &str) -> Self {
        Self {
            name: Some(tool_name.to_string()),
            tool_call_id: Some(call_id.to_string()),
            ..Self::plain(ROLE_TOOL, content)
        }
    }
}

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_kind")]
    pub kind: String,
    pub function: ChatToolCallFunction,
}

impl ChatToolCall {
    pub fn function(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: default_tool_call_kind(),
            function: ChatToolCallFunction {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

fn default_tool_call_kind() -> String {
    TOOL_CALL_KIND_FUNCTION.to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

impl ChatToolDefinition {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: TOOL_CALL_KIND_FUNCTION.to_string(),
            function: ChatToolFunction {
                name: name.to_string(),
                description: (!description.is_empty()).then(|| description.to_string()),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

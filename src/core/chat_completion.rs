//! Non-streaming `/chat/completions` client and the model seam used by the
//! orchestration loop.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::api::{ChatCompletionResponse, ChatMessage, ChatRequest, ChatToolDefinition};
use crate::core::error::SessionError;
use crate::core::transcript::ToolInvocationRequest;

const CHAT_CONNECT_TIMEOUT_SECONDS: u64 = 30;
const TOOL_CHOICE_AUTO: &str = "auto";

/// One model reply: optional text plus the tool calls it requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolInvocationRequest>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends the whole transcript. `tools` is `None` when the request must not
    /// offer tools at all.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ChatToolDefinition]>,
    ) -> Result<Completion, SessionError>;
}

pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CHAT_CONNECT_TIMEOUT_SECONDS))
            .build()
            .map_err(|err| SessionError::Api {
                status: None,
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ChatToolDefinition]>,
    ) -> ChatRequest {
        let tools = tools.filter(|tools| !tools.is_empty()).map(<[_]>::to_vec);
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream: false,
            tool_choice: tools.as_ref().map(|_| TOOL_CHOICE_AUTO.to_string()),
            tools,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ChatToolDefinition]>,
    ) -> Result<Completion, SessionError> {
        let request = self.build_request(messages, tools);
        let chat_url = chat_completions_url(&self.base_url);
        debug!(
            url = %chat_url,
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|err| SessionError::Api {
                status: None,
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(SessionError::Api {
                status: Some(status.as_u16()),
                message: summarize_api_error(&error_text),
            });
        }

        let body = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|err| SessionError::Api {
                status: Some(status.as_u16()),
                message: format!("Invalid response body: {err}"),
            })?;
        completion_from_response(body)
    }
}

pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn completion_from_response(response: ChatCompletionResponse) -> Result<Completion, SessionError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(SessionError::Api {
            status: None,
            message: "Response contained no choices".to_string(),
        });
    };
    debug!(finish_reason = ?choice.finish_reason, "Chat completion received");

    Ok(Completion {
        text: choice.message.content,
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ToolInvocationRequest::from)
            .collect(),
    })
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

/// Reduces an error body to one line: the provider's message when the body is
/// JSON that carries one, the compact JSON otherwise, or the trimmed text.
pub fn summarize_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json_value) => {
            extract_error_summary(&json_value).unwrap_or_else(|| json_value.to_string())
        }
        Err(_) => trimmed.to_string(),
    }
}

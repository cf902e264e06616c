//! The per-query tool-calling loop.
//!
//! One call to [`Orchestrator::process_query`] runs at most two model calls:
//! the first offers the current catalogue, tool calls it requests are
//! dispatched one after another, and the second folds their results into the
//! final answer without offering tools again.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::core::catalogue::{
    render_tool_lines, tool_definitions, tool_names, CatalogueReader, ToolDescriptor,
    ToolSnapshot,
};
use crate::core::chat_completion::ChatModel;
use crate::core::error::SessionError;
use crate::core::transcript::{ToolInvocationRequest, Transcript};
use crate::mcp::transport::ToolTransport;

const TOOLS_PLACEHOLDER: &str = "{tools}";

pub struct Orchestrator {
    transcript: Transcript,
    catalogue: CatalogueReader,
    tools: ToolSnapshot,
    prompt_template: String,
    transport: Arc<dyn ToolTransport>,
    model: Arc<dyn ChatModel>,
}

impl Orchestrator {
    /// Seeds the system turn from the catalogue's current snapshot.
    pub fn new(
        transport: Arc<dyn ToolTransport>,
        model: Arc<dyn ChatModel>,
        catalogue: CatalogueReader,
        prompt_template: impl Into<String>,
    ) -> Self {
        let prompt_template = prompt_template.into();
        let tools = catalogue.peek();
        let transcript = Transcript::new(render_system_prompt(&prompt_template, &tools));
        Self {
            transcript,
            catalogue,
            tools,
            prompt_template,
            transport,
            model,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Answers one user utterance. Failures never escape: model errors become
    /// the returned text, tool errors become inline annotations.
    pub async fn process_query(&mut self, query: &str) -> String {
        self.refresh_catalogue();
        self.transcript.push_user(query);

        let definitions = tool_definitions(&self.tools);
        let offered = (!definitions.is_empty()).then_some(definitions.as_slice());
        let first = match self
            .model
            .complete(&self.transcript.to_api_messages(), offered)
            .await
        {
            Ok(completion) => completion,
            Err(err) => return error_answer(&err),
        };

        let first_text = first.text.unwrap_or_default();
        self.transcript.push_assistant(first_text.as_str(), first.tool_calls.clone());
        if first.tool_calls.is_empty() {
            return first_text;
        }

        let mut parts = Vec::with_capacity(first.tool_calls.len() + 2);
        parts.push(first_text);
        for call in &first.tool_calls {
            parts.push(self.dispatch(call).await);
        }

        let second = match self
            .model
            .complete(&self.transcript.to_api_messages(), None)
            .await
        {
            Ok(completion) => completion,
            Err(err) => return error_answer(&err),
        };
        if !second.tool_calls.is_empty() {
            warn!(
                count = second.tool_calls.len(),
                "Ignoring tool calls requested after tool results"
            );
        }
        let final_text = second.text.unwrap_or_default();
        self.transcript.push_assistant(final_text.as_str(), Vec::new());
        parts.push(final_text);

        parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn refresh_catalogue(&mut self) {
        let Some(snapshot) = self.catalogue.take_if_changed() else {
            return;
        };
        info!(tools = ?tool_names(&snapshot), "Using refreshed tool catalogue");
        self.tools = snapshot;
        self.transcript.replace_system(render_system_prompt(&self.prompt_template, &self.tools));
    }

    /// Runs one tool call and returns its annotation. Only successful calls
    /// add a tool turn.
    async fn dispatch(&mut self, call: &ToolInvocationRequest) -> String {
        let outcome = match decode_arguments(&call.arguments) {
            Ok(arguments) => {
                debug!(tool = %call.tool_name, call_id = %call.call_id, "Calling tool");
                self.transport.call_tool(&call.tool_name, arguments).await
            }
            Err(message) => Err(SessionError::tool(&call.tool_name, message)),
        };

        match outcome {
            Ok(output) => {
                let recorded = self.transcript.push_tool_result(
                    &call.call_id,
                    &call.tool_name,
                    &output.content,
                );
                if let Err(err) = recorded {
                    warn!(error = %err, "Tool result not recorded");
                }
                format!("[Tool {} result: {}]", call.tool_name, single_line(&output.content))
            }
            Err(err) => {
                let err = match err {
                    SessionError::Tool { .. } => err,
                    other => SessionError::tool(&call.tool_name, other.to_string()),
                };
                warn!(error = %err, "Tool call failed");
                format!("[Error: {}]", single_line(&err.to_string()))
            }
        }
    }
}

pub fn render_system_prompt(template: &str, tools: &[ToolDescriptor]) -> String {
    template.replace(TOOLS_PLACEHOLDER, &render_tool_lines(tools))
}

/// Decodes model-produced argument text. Blank text and `null` mean "no
/// arguments"; anything but a JSON object is rejected.
pub fn decode_arguments(raw: &str) -> Result<Option<Map<String, Value>>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(format!("Tool arguments must be a JSON object, got {other}")),
        Err(err) => Err(format!("Invalid tool arguments: {err}")),
    }
}

/// Keeps an annotation on one line; embedded line breaks are shown as `\n`.
fn single_line(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join("\\n")
}

fn error_answer(err: &SessionError) -> String {
    warn!(error = %err, "Query failed");
    format!("Error processing query: {err}")
}

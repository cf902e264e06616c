use std::future::Future;

use rust_mcp_schema::schema_utils::ServerMessage;
use rust_mcp_schema::{
    CallToolResult, ClientCapabilities, Implementation, InitializeRequestParams,
    InitializeResult, ListToolsResult, PaginatedRequestParams, RequestId, RpcError, Tool,
    LATEST_PROTOCOL_VERSION,
};
use serde_json::{json, Value};

use super::events::{notification_event, NotificationEvent};
use crate::core::catalogue::ToolDescriptor;

pub const MCP_MAX_TOOL_LIST: usize = 100;
pub const METHOD_PING: &str = "ping";

/// One decoded line from the server.
#[derive(Debug)]
pub enum IncomingMessage {
    /// Response or error for a request this client sent.
    Reply(ServerMessage),
    /// Liveness probe that the transport answers on its own.
    Ping(RequestId),
    Event(NotificationEvent),
}

/// Splits server traffic into replies, pings and session events.
///
/// Requests and notifications are recognised from the raw JSON so that
/// methods this client has no typed model for still reach the listener.
pub fn classify_message(value: Value) -> Result<IncomingMessage, String> {
    let Some(method) = value.get("method").and_then(Value::as_str) else {
        return serde_json::from_value::<ServerMessage>(value)
            .map(IncomingMessage::Reply)
            .map_err(|err| err.to_string());
    };

    match value.get("id") {
        Some(id) => {
            let id = serde_json::from_value::<RequestId>(id.clone())
                .map_err(|err| format!("Invalid request id: {err}"))?;
            if method == METHOD_PING {
                return Ok(IncomingMessage::Ping(id));
            }
            let kind = method.to_string();
            let payload = value.get("params").cloned().unwrap_or(Value::Null);
            Ok(IncomingMessage::Event(NotificationEvent::InboundRequest {
                id,
                kind,
                payload,
            }))
        }
        None => Ok(IncomingMessage::Event(notification_event(value))),
    }
}

pub fn reply_id(message: &ServerMessage) -> Option<&RequestId> {
    match message {
        ServerMessage::Response(response) => Some(&response.id),
        ServerMessage::Error(error) => error.id.as_ref(),
        _ => None,
    }
}

pub fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "toolbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Toolbridge MCP Client".to_string()),
            description: Some("Terminal chat agent bridging an LLM with MCP tools".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

pub fn paginated_params(cursor: Option<String>) -> Option<PaginatedRequestParams> {
    cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    })
}

/// Follows `next_cursor` until the listing is exhausted or the cap is hit.
pub async fn collect_tool_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<Tool>, String>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListToolsResult, String>>,
{
    let first = fetch_page(None).await?;
    let mut tools = first.tools;
    let mut next_cursor = first.next_cursor;

    while tools.len() < MCP_MAX_TOOL_LIST {
        let Some(cursor) = next_cursor.take() else {
            break;
        };
        let page = fetch_page(Some(cursor)).await?;
        tools.extend(page.tools);
        next_cursor = page.next_cursor;
    }

    tools.truncate(MCP_MAX_TOOL_LIST);
    Ok(tools)
}

pub fn descriptor_from_tool(tool: Tool) -> ToolDescriptor {
    let input_schema =
        serde_json::to_value(&tool.input_schema).unwrap_or_else(|_| json!({"type": "object"}));
    ToolDescriptor::new(tool.name, tool.description.unwrap_or_default(), input_schema)
}

pub fn parse_initialize_result(message: ServerMessage) -> Result<InitializeResult, String> {
    let value = parse_response_value(message)?;
    let result =
        serde_json::from_value::<InitializeResult>(value).map_err(|err| err.to_string())?;
    if result.protocol_version.trim().is_empty() {
        return Err("Unexpected initialize response.".to_string());
    }
    Ok(result)
}

pub fn parse_list_tools(message: ServerMessage) -> Result<ListToolsResult, String> {
    parse_response(message)
}

pub fn parse_call_tool(message: ServerMessage) -> Result<CallToolResult, String> {
    parse_response(message)
}

fn parse_response<T: serde::de::DeserializeOwned>(message: ServerMessage) -> Result<T, String> {
    let value = parse_response_value(message)?;
    serde_json::from_value::<T>(value).map_err(|err| err.to_string())
}

pub fn parse_response_value(message: ServerMessage) -> Result<Value, String> {
    match message {
        ServerMessage::Response(response) => {
            serde_json::to_value(&response.result).map_err(|err| err.to_string())
        }
        ServerMessage::Error(error) => Err(format_rpc_error(&error.error)),
        other => Err(format!("Unexpected MCP server message: {other:?}")),
    }
}

pub fn format_rpc_error(error: &RpcError) -> String {
    let mut output = format!("MCP error {}: {}", error.code, error.message);
    if let Some(data) = &error.data {
        let details = data
            .get("details")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .or_else(|| data.as_str().map(|value| value.to_string()))
            .or_else(|| serde_json::to_string(data).ok());

        if let Some(details) = details.filter(|details| !details.is_empty()) {
            output.push_str(" (");
            output.push_str(&details);
            output.push(')');
        }
    }
    output
}

/// Outcome of a tool call rendered for the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedToolResult {
    pub text: String,
    pub is_error: bool,
}

/// Flattens a tool result into text: text blocks verbatim, any other block as
/// compact JSON, structured content when there are no blocks at all.
pub fn render_call_tool_result(result: &CallToolResult) -> RenderedToolResult {
    let value = serde_json::to_value(result).unwrap_or(Value::Null);
    render_call_tool_value(&value)
}

pub fn render_call_tool_value(value: &Value) -> RenderedToolResult {
    let blocks = value
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut parts: Vec<String> = blocks
        .iter()
        .map(|block| match (block.get("type").and_then(Value::as_str), block.get("text")) {
            (Some("text"), Some(Value::String(text))) => text.clone(),
            _ => block.to_string(),
        })
        .collect();

    if parts.is_empty() {
        if let Some(structured) = value.get("structuredContent").filter(|v| !v.is_null()) {
            parts.push(structured.to_string());
        }
    }

    RenderedToolResult {
        text: parts.join("\n"),
        is_error: value
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

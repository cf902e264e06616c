use rust_mcp_schema::RequestId;
use serde_json::Value;

pub const METHOD_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const METHOD_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
pub const METHOD_RESOURCE_UPDATED: &str = "notifications/resources/updated";
pub const METHOD_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
pub const METHOD_PROGRESS: &str = "notifications/progress";
pub const METHOD_CANCELLED: &str = "notifications/cancelled";
pub const METHOD_LOG_MESSAGE: &str = "notifications/message";

/// Unsolicited traffic from the tool server, as seen by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    CatalogueChanged,
    /// `uri` is set for a single updated resource, absent when the whole
    /// resource list changed.
    ResourceChanged {
        uri: Option<String>,
    },
    PromptsChanged,
    Progress {
        token: Value,
        current: f64,
        total: Option<f64>,
        message: Option<String>,
    },
    Cancelled {
        request_id: Value,
        reason: Option<String>,
    },
    LogMessage {
        level: String,
        logger: Option<String>,
        text: String,
    },
    /// A server request that expects a reply.
    InboundRequest {
        id: RequestId,
        kind: String,
        payload: Value,
    },
    Unknown {
        raw: Value,
    },
}

impl NotificationEvent {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationEvent::CatalogueChanged => "catalogue_changed",
            NotificationEvent::ResourceChanged { .. } => "resource_changed",
            NotificationEvent::PromptsChanged => "prompts_changed",
            NotificationEvent::Progress { .. } => "progress",
            NotificationEvent::Cancelled { .. } => "cancelled",
            NotificationEvent::LogMessage { .. } => "log_message",
            NotificationEvent::InboundRequest { .. } => "inbound_request",
            NotificationEvent::Unknown { .. } => "unknown",
        }
    }
}

/// Maps a JSON-RPC notification onto an event. Shapes that do not match the
/// protocol degrade to [`NotificationEvent::Unknown`].
pub fn notification_event(raw: Value) -> NotificationEvent {
    let method = raw.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = raw.get("params");
    let str_param =
        |key: &str| params.and_then(|p| p.get(key)).and_then(Value::as_str).map(str::to_string);

    match method {
        METHOD_TOOLS_LIST_CHANGED => NotificationEvent::CatalogueChanged,
        METHOD_RESOURCES_LIST_CHANGED => NotificationEvent::ResourceChanged { uri: None },
        METHOD_RESOURCE_UPDATED => NotificationEvent::ResourceChanged {
            uri: str_param("uri"),
        },
        METHOD_PROMPTS_LIST_CHANGED => NotificationEvent::PromptsChanged,
        METHOD_PROGRESS => {
            let current = params.and_then(|p| p.get("progress")).and_then(Value::as_f64);
            let token = params.and_then(|p| p.get("progressToken")).cloned();
            match (token, current) {
                (Some(token), Some(current)) => NotificationEvent::Progress {
                    token,
                    current,
                    total: params.and_then(|p| p.get("total")).and_then(Value::as_f64),
                    message: str_param("message"),
                },
                _ => NotificationEvent::Unknown { raw },
            }
        }
        METHOD_CANCELLED => match params.and_then(|p| p.get("requestId")).cloned() {
            Some(request_id) => NotificationEvent::Cancelled {
                request_id,
                reason: str_param("reason"),
            },
            None => NotificationEvent::Unknown { raw },
        },
        METHOD_LOG_MESSAGE => {
            let Some(data) = params.and_then(|p| p.get("data").or_else(|| p.get("message"))) else {
                return NotificationEvent::Unknown { raw };
            };
            let text = match data {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            NotificationEvent::LogMessage {
                level: str_param("level").unwrap_or_else(|| "info".to_string()),
                logger: str_param("logger"),
                text,
            }
        }
        _ => NotificationEvent::Unknown { raw },
    }
}

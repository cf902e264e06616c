//! Background task draining server notifications for the lifetime of a
//! session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::catalogue::CatalogueWriter;
use crate::mcp::events::NotificationEvent;
use crate::mcp::transport::ToolTransport;

pub fn spawn_listener<T>(
    mut events: mpsc::UnboundedReceiver<NotificationEvent>,
    transport: Arc<T>,
    catalogue: CatalogueWriter,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    T: ToolTransport + ?Sized + 'static,
{
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!("MCP event stream ended");
                break;
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = handle_event(event, transport.as_ref(), &catalogue) => {}
            }
        }
        debug!("Notification listener stopped");
    })
}

pub async fn handle_event<T>(event: NotificationEvent, transport: &T, catalogue: &CatalogueWriter)
where
    T: ToolTransport + ?Sized,
{
    match event {
        NotificationEvent::CatalogueChanged => match transport.list_tools().await {
            Ok(tools) => {
                info!(count = tools.len(), "Tool catalogue refreshed");
                catalogue.replace(tools);
            }
            Err(err) => warn!(error = %err, "Tool catalogue refresh failed; keeping previous list"),
        },
        NotificationEvent::ResourceChanged { uri: Some(uri) } => {
            info!(uri = %uri, "MCP resource updated")
        }
        NotificationEvent::ResourceChanged { uri: None } => info!("MCP resource list changed"),
        NotificationEvent::PromptsChanged => info!("MCP prompt list changed"),
        NotificationEvent::Progress {
            token,
            current,
            total,
            message,
        } => debug!(
            token = %token,
            current,
            total = ?total,
            message = message.as_deref().unwrap_or_default(),
            "MCP progress"
        ),
        NotificationEvent::Cancelled { request_id, reason } => info!(
            request_id = %request_id,
            reason = reason.as_deref().unwrap_or_default(),
            "MCP server cancelled a request"
        ),
        NotificationEvent::LogMessage {
            level,
            logger,
            text,
        } => log_server_message(&level, logger.as_deref().unwrap_or("server"), &text),
        NotificationEvent::InboundRequest { id, kind, .. } => {
            info!(request_id = ?id, method = %kind, "Rejecting MCP server request");
            let message = format!("Unsupported MCP request from server: {kind}");
            if let Err(err) = transport.reject_request(id, &message).await {
                warn!(error = %err, "Failed to reject MCP server request");
            }
        }
        NotificationEvent::Unknown { raw } => debug!(raw = %raw, "Ignoring MCP notification"),
    }
}

/// Maps MCP log levels (RFC 5424 names) onto tracing levels.
fn log_server_message(level: &str, logger: &str, text: &str) {
    match level {
        "debug" => debug!(logger = logger, "{text}"),
        "info" | "notice" => info!(logger = logger, "{text}"),
        "warning" => warn!(logger = logger, "{text}"),
        "error" | "critical" | "alert" | "emergency" => error!(logger = logger, "{text}"),
        other => info!(logger = logger, level = other, "{text}"),
    }
}

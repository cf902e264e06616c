//! Transport contract between the session and a tool server.
//!
//! The orchestration loop and the listener only see this trait; the stdio
//! implementation lives in [`stdio`] and tests plug in in-memory fakes.

use async_trait::async_trait;
use rust_mcp_schema::RequestId;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::core::catalogue::ToolDescriptor;
use crate::core::error::SessionError;
use crate::mcp::events::NotificationEvent;

pub mod stdio;

/// Rendered outcome of a successful tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// `initialize` followed by `notifications/initialized`.
    async fn handshake(&self) -> Result<(), SessionError>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError>;

    /// Invokes `name`. A result the server flags as an error is returned as
    /// [`SessionError::Tool`].
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, SessionError>;

    /// Answers a server request with a JSON-RPC "method not found" error.
    async fn reject_request(&self, id: RequestId, message: &str) -> Result<(), SessionError>;

    /// Hands out the event stream. Yields `Some` at most once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<NotificationEvent>>;

    /// Stops the server. Calling it again is a no-op.
    async fn shutdown(&self);
}

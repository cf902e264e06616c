//! Line-delimited JSON-RPC over a spawned server's stdin/stdout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{CallToolRequestParams, ListToolsResult, RequestId, RpcError};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::{ToolOutput, ToolTransport};
use crate::core::catalogue::ToolDescriptor;
use crate::core::error::SessionError;
use crate::mcp::events::NotificationEvent;
use crate::mcp::launcher::ServerLaunch;
use crate::mcp::protocol::{
    classify_message, client_details, collect_tool_pages, descriptor_from_tool,
    paginated_params, parse_call_tool, parse_initialize_result, parse_list_tools,
    render_call_tool_result, reply_id, IncomingMessage,
};

const STDIN_WRITE_TIMEOUT_SECONDS: u64 = 10;

type PendingReplies = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;
type SharedStdin = Arc<Mutex<ChildStdin>>;

pub struct StdioTransport {
    stdin: SharedStdin,
    child: Mutex<Option<Child>>,
    pending: PendingReplies,
    next_request_id: AtomicI64,
    events: std::sync::Mutex<Option<mpsc::UnboundedReceiver<NotificationEvent>>>,
    server_label: String,
}

impl StdioTransport {
    /// Spawns the server and starts the stdout reader. No protocol traffic is
    /// exchanged until [`ToolTransport::handshake`].
    pub async fn connect(launch: &ServerLaunch) -> Result<Self, SessionError> {
        let server_label = launch.describe();
        debug!(command = %launch.command, args = ?launch.args, "Starting MCP stdio server");

        let mut child = Command::new(&launch.command)
            .args(&launch.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SessionError::Connection(format!("{server_label}: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Connection("Unable to retrieve stdin.".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Connection("Unable to retrieve stdout.".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::Connection("Unable to retrieve stderr.".to_string()))?;

        let stdin: SharedStdin = Arc::new(Mutex::new(stdin));
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self::spawn_stdout_reader(stdout, pending.clone(), stdin.clone(), events_tx);
        Self::spawn_stderr_drain(stderr);

        Ok(Self {
            stdin,
            child: Mutex::new(Some(child)),
            pending,
            next_request_id: AtomicI64::new(0),
            events: std::sync::Mutex::new(Some(events_rx)),
            server_label,
        })
    }

    fn spawn_stdout_reader(
        stdout: ChildStdout,
        pending: PendingReplies,
        stdin: SharedStdin,
        events_tx: mpsc::UnboundedSender<NotificationEvent>,
    ) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let value = match serde_json::from_str::<Value>(&line) {
                    Ok(value) => value,
                    Err(_) => {
                        debug!(line = %line, "Ignoring non-JSON line from MCP stdio server");
                        continue;
                    }
                };
                let items = match value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                for item in items {
                    Self::dispatch_message(item, &pending, &stdin, &events_tx).await;
                }
            }

            debug!("MCP stdio server closed stdout");
            // Dropping the senders wakes every waiter with a closed channel.
            pending.lock().await.clear();
        });
    }

    fn spawn_stderr_drain(stderr: tokio::process::ChildStderr) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(target: "toolbridge::server", "{line}");
            }
        });
    }

    async fn dispatch_message(
        value: Value,
        pending: &PendingReplies,
        stdin: &SharedStdin,
        events_tx: &mpsc::UnboundedSender<NotificationEvent>,
    ) {
        let message = match classify_message(value) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "Ignoring unrecognised MCP stdio message");
                return;
            }
        };

        match message {
            IncomingMessage::Reply(reply) => {
                let mut pending = pending.lock().await;
                let id = match reply_id(&reply) {
                    Some(id) => id.clone(),
                    None => {
                        // Parse errors carry a null id; blame the oldest request.
                        let Some(id) = oldest_pending_id(&pending) else {
                            warn!(reply = ?reply, "Dropping MCP stdio error without request id");
                            return;
                        };
                        warn!(request_id = ?id, "MCP stdio error without request id");
                        id
                    }
                };
                debug!(response_id = ?id, "Received MCP stdio response");
                if let Some(tx) = pending.remove(&id) {
                    let _ = tx.send(reply);
                }
            }
            IncomingMessage::Ping(id) => {
                debug!(request_id = ?id, "Answering MCP ping");
                let pong = json!({"jsonrpc": "2.0", "id": id, "result": {}});
                if let Err(err) = write_line(stdin, &pong.to_string()).await {
                    warn!(error = %err, "Failed to answer MCP ping");
                }
            }
            IncomingMessage::Event(event) => {
                debug!(kind = event.label(), "Received MCP stdio event");
                // The listener may already be gone during teardown.
                let _ = events_tx.send(event);
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Integer(self.next_request_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id();
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| err.to_string())?;
        let payload = serde_json::to_string(&message).map_err(|err| err.to_string())?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        debug!(request_id = ?request_id, bytes = payload.len(), "Sending MCP stdio request");
        if let Err(err) = write_line(&self.stdin, &payload).await {
            self.pending.lock().await.remove(&request_id);
            return Err(err);
        }

        rx.await.map_err(|_| {
            debug!(request_id = ?request_id, "MCP stdio response channel closed");
            "MCP server closed the connection.".to_string()
        })
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        self.send_client_message(&message).await
    }

    async fn send_client_message(&self, message: &ClientMessage) -> Result<(), String> {
        let payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
        write_line(&self.stdin, &payload).await
    }

    async fn fetch_tools_page(&self, cursor: Option<String>) -> Result<ListToolsResult, String> {
        let response = self
            .send_request(RequestFromClient::ListToolsRequest(paginated_params(cursor)))
            .await?;
        parse_list_tools(response)
    }
}

fn oldest_pending_id(
    pending: &HashMap<RequestId, oneshot::Sender<ServerMessage>>,
) -> Option<RequestId> {
    pending
        .keys()
        .filter_map(|id| match id {
            RequestId::Integer(n) => Some(*n),
            _ => None,
        })
        .min()
        .map(RequestId::Integer)
}

async fn write_line(stdin: &SharedStdin, payload: &str) -> Result<(), String> {
    let write_timeout = tokio::time::Duration::from_secs(STDIN_WRITE_TIMEOUT_SECONDS);
    let mut stdin = tokio::time::timeout(write_timeout, stdin.lock())
        .await
        .map_err(|_| "Timed out waiting for MCP stdio stdin lock.".to_string())?;
    tokio::time::timeout(write_timeout, async {
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    })
    .await
    .map_err(|_| "Timed out writing to MCP stdio server.".to_string())?
    .map_err(|err| err.to_string())
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn handshake(&self) -> Result<(), SessionError> {
        let response = self
            .send_request(RequestFromClient::InitializeRequest(client_details()))
            .await
            .map_err(SessionError::Protocol)?;
        let result = parse_initialize_result(response).map_err(SessionError::Protocol)?;
        info!(
            server = %self.server_label,
            protocol_version = %result.protocol_version,
            "MCP server initialized"
        );
        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await
            .map_err(SessionError::Protocol)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        let tools = collect_tool_pages(|cursor| self.fetch_tools_page(cursor))
            .await
            .map_err(SessionError::Protocol)?;
        debug!(count = tools.len(), "Listed MCP tools");
        Ok(tools.into_iter().map(descriptor_from_tool).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, SessionError> {
        let mut params = CallToolRequestParams::new(name);
        if let Some(arguments) = arguments {
            params = params.with_arguments(arguments);
        }

        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await
            .map_err(|err| SessionError::tool(name, err))?;
        let result = parse_call_tool(response).map_err(|err| SessionError::tool(name, err))?;
        let rendered = render_call_tool_result(&result);
        if rendered.is_error {
            let message = if rendered.text.is_empty() {
                "the server reported an error".to_string()
            } else {
                rendered.text
            };
            return Err(SessionError::tool(name, message));
        }
        Ok(ToolOutput::new(rendered.text))
    }

    async fn reject_request(&self, id: RequestId, message: &str) -> Result<(), SessionError> {
        let error = RpcError::method_not_found().with_message(message);
        let message = ClientMessage::from_message(MessageFromClient::Error(error), Some(id))
            .map_err(|err| SessionError::Protocol(err.to_string()))?;
        self.send_client_message(&message)
            .await
            .map_err(SessionError::Protocol)
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<NotificationEvent>> {
        self.events.lock().ok()?.take()
    }

    async fn shutdown(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        if let Err(err) = child.kill().await {
            debug!(error = %err, "MCP stdio server already exited");
        }
        self.pending.lock().await.clear();
        info!(server = %self.server_label, "MCP server stopped");
    }
}

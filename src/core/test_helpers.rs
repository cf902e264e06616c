use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_mcp_schema::RequestId;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::api::{ChatMessage, ChatToolDefinition};
use crate::core::catalogue::ToolDescriptor;
use crate::core::chat_completion::{ChatModel, Completion};
use crate::core::error::SessionError;
use crate::core::transcript::ToolInvocationRequest;
use crate::mcp::events::NotificationEvent;
use crate::mcp::transport::{ToolOutput, ToolTransport};

pub fn sample_tool(name: &str) -> ToolDescriptor {
    ToolDescriptor::new(
        name,
        format!("{name} tool"),
        json!({"type": "object", "properties": {}}),
    )
}

pub fn text_reply(text: &str) -> Completion {
    Completion {
        text: Some(text.to_string()),
        tool_calls: Vec::new(),
    }
}

pub fn tool_reply(text: Option<&str>, calls: &[(&str, &str, &str)]) -> Completion {
    Completion {
        text: text.map(str::to_string),
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| ToolInvocationRequest::new(*id, *name, *args))
            .collect(),
    }
}

/// In-memory tool server. Tool results are scripted per tool name; unknown
/// tools fail the way a real server rejects them.
pub struct FakeTransport {
    tools: Mutex<Vec<ToolDescriptor>>,
    list_error: Mutex<Option<String>>,
    handshake_error: Mutex<Option<SessionError>>,
    results: Mutex<HashMap<String, Result<String, String>>>,
    calls: Mutex<Vec<(String, Option<Map<String, Value>>)>>,
    rejected: Mutex<Vec<(RequestId, String)>>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<NotificationEvent>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<NotificationEvent>>>,
    list_calls: AtomicUsize,
    handshakes: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl FakeTransport {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tools: Mutex::new(tools),
            list_error: Mutex::new(None),
            handshake_error: Mutex::new(None),
            results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            rejected: Mutex::new(Vec::new()),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
            list_calls: AtomicUsize::new(0),
            handshakes: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn set_tools(&self, tools: Vec<ToolDescriptor>) {
        *self.tools.lock().unwrap() = tools;
    }

    pub fn fail_list_tools(&self, message: &str) {
        *self.list_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_handshake(&self, error: SessionError) {
        *self.handshake_error.lock().unwrap() = Some(error);
    }

    pub fn tool_result(&self, name: &str, result: Result<&str, &str>) {
        self.results.lock().unwrap().insert(
            name.to_string(),
            result.map(str::to_string).map_err(str::to_string),
        );
    }

    pub fn event_sender(&self) -> mpsc::UnboundedSender<NotificationEvent> {
        self.events_tx
            .lock()
            .unwrap()
            .clone()
            .expect("event sender already taken")
    }

    /// Takes the only sender so the event stream ends once it is dropped.
    pub fn take_event_sender(&self) -> Option<mpsc::UnboundedSender<NotificationEvent>> {
        self.events_tx.lock().unwrap().take()
    }

    pub fn calls(&self) -> Vec<(String, Option<Map<String, Value>>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rejected(&self) -> Vec<(RequestId, String)> {
        self.rejected.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolTransport for FakeTransport {
    async fn handshake(&self) -> Result<(), SessionError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        match self.handshake_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_error.lock().unwrap().clone() {
            return Err(SessionError::Protocol(message));
        }
        Ok(self.tools.lock().unwrap().clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, SessionError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        match self.results.lock().unwrap().get(name) {
            Some(Ok(content)) => Ok(ToolOutput::new(content.clone())),
            Some(Err(message)) => Err(SessionError::tool(name, message.clone())),
            None => Err(SessionError::tool(name, format!("Unknown tool: {name}"))),
        }
    }

    async fn reject_request(&self, id: RequestId, message: &str) -> Result<(), SessionError> {
        self.rejected
            .lock()
            .unwrap()
            .push((id, message.to_string()));
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<NotificationEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Model that replays queued completions and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Completion, SessionError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<ChatToolDefinition>>,
}

impl RecordedRequest {
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .iter()
            .flatten()
            .map(|tool| tool.function.name.clone())
            .collect()
    }
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<Completion, SessionError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ChatToolDefinition]>,
    ) -> Result<Completion, SessionError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.map(<[_]>::to_vec),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Completion::default()))
    }
}

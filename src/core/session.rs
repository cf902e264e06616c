//! Session lifecycle: handshake, initial catalogue, listener start and
//! teardown.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::catalogue::{catalogue, tool_names, CatalogueWriter};
use crate::core::chat_completion::ChatModel;
use crate::core::error::SessionError;
use crate::core::listener::spawn_listener;
use crate::core::orchestrator::Orchestrator;
use crate::core::transcript::Transcript;
use crate::mcp::transport::ToolTransport;

pub struct Session {
    orchestrator: Orchestrator,
    transport: Arc<dyn ToolTransport>,
    catalogue: CatalogueWriter,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl Session {
    /// Completes the handshake, loads the tool list and starts the listener.
    ///
    /// On failure the transport is shut down before the error is returned.
    pub async fn bootstrap(
        transport: Arc<dyn ToolTransport>,
        model: Arc<dyn ChatModel>,
        prompt_template: &str,
    ) -> Result<Self, SessionError> {
        match Self::start(transport.clone(), model, prompt_template).await {
            Ok(session) => Ok(session),
            Err(err) => {
                warn!(error = %err, "Session bootstrap failed");
                transport.shutdown().await;
                Err(err)
            }
        }
    }

    async fn start(
        transport: Arc<dyn ToolTransport>,
        model: Arc<dyn ChatModel>,
        prompt_template: &str,
    ) -> Result<Self, SessionError> {
        transport.handshake().await?;
        let tools = transport.list_tools().await.map_err(|err| match err {
            SessionError::Protocol(_) => err,
            other => SessionError::Protocol(other.to_string()),
        })?;
        info!(tools = ?tool_names(&tools), "Connected to tool server");

        let events = transport.take_events().ok_or_else(|| {
            SessionError::Protocol("Tool server event stream was already taken".to_string())
        })?;
        let (writer, reader) = catalogue(tools);
        let orchestrator = Orchestrator::new(transport.clone(), model, reader, prompt_template);

        let cancel = CancellationToken::new();
        let listener = spawn_listener(events, transport.clone(), writer.clone(), cancel.clone());

        Ok(Self {
            orchestrator,
            transport,
            catalogue: writer,
            cancel,
            listener: Some(listener),
        })
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.catalogue
            .snapshot()
            .iter()
            .map(|tool| tool.name.clone())
            .collect()
    }

    pub fn transcript(&self) -> &Transcript {
        self.orchestrator.transcript()
    }

    pub async fn process_query(&mut self, query: &str) -> String {
        self.orchestrator.process_query(query).await
    }

    /// Stops the listener, then the server. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(listener) = self.listener.take() {
            if let Err(err) = listener.await {
                debug!(error = %err, "Notification listener ended abnormally");
            }
        }
        self.transport.shutdown().await;
    }
}

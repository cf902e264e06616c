//! Tool catalogue shared between the notification listener and the
//! orchestration loop.
//!
//! The catalogue is a `watch` channel carrying an immutable snapshot. The
//! listener replaces the whole snapshot with [`CatalogueWriter::replace`];
//! the loop checks [`CatalogueReader::is_dirty`] at the start of each turn
//! and takes the new snapshot with [`CatalogueReader::take_if_changed`],
//! which clears the flag in the same step.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::api::ChatToolDefinition;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

pub type ToolSnapshot = Arc<[ToolDescriptor]>;

/// Creates a catalogue seeded with the initial tool list.
///
/// The initial list counts as consumed: the reader starts clean.
pub fn catalogue(initial: Vec<ToolDescriptor>) -> (CatalogueWriter, CatalogueReader) {
    let (tx, rx) = watch::channel::<ToolSnapshot>(initial.into());
    (CatalogueWriter { tx: Arc::new(tx) }, CatalogueReader { rx })
}

#[derive(Clone)]
pub struct CatalogueWriter {
    tx: Arc<watch::Sender<ToolSnapshot>>,
}

impl CatalogueWriter {
    /// Swaps in a new tool list and marks the catalogue as changed.
    pub fn replace(&self, tools: Vec<ToolDescriptor>) {
        self.tx.send_replace(tools.into());
    }

    pub fn snapshot(&self) -> ToolSnapshot {
        self.tx.borrow().clone()
    }
}

pub struct CatalogueReader {
    rx: watch::Receiver<ToolSnapshot>,
}

impl CatalogueReader {
    pub fn is_dirty(&self) -> bool {
        // Closed only after every writer is dropped; nothing new can arrive.
        self.rx.has_changed().unwrap_or(false)
    }

    /// Returns the newest snapshot and clears the dirty flag, or `None` when
    /// nothing changed since the last call.
    pub fn take_if_changed(&mut self) -> Option<ToolSnapshot> {
        if !self.is_dirty() {
            return None;
        }
        Some(self.rx.borrow_and_update().clone())
    }

    /// Current snapshot without touching the dirty flag.
    pub fn peek(&self) -> ToolSnapshot {
        self.rx.borrow().clone()
    }
}

/// Renders one `- name: description` line per tool, in catalogue order.
pub fn render_tool_lines(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .map(|tool| {
            if tool.description.is_empty() {
                format!("- {}", tool.name)
            } else {
                format!("- {}: {}", tool.name, tool.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Maps the catalogue onto chat-completion function definitions.
pub fn tool_definitions(tools: &[ToolDescriptor]) -> Vec<ChatToolDefinition> {
    tools
        .iter()
        .map(|tool| {
            ChatToolDefinition::function(&tool.name, &tool.description, tool.input_schema.clone())
        })
        .collect()
}

pub fn tool_names(tools: &[ToolDescriptor]) -> Vec<&str> {
    tools.iter().map(|tool| tool.name.as_str()).collect()
}

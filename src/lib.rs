//! Toolbridge is a terminal chat agent that lets an OpenAI-compatible model
//! call tools hosted by a local MCP server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session: tool catalogue, transcript, notification
//!   listener and the tool-calling loop, plus config and the model client.
//! - [`mcp`] speaks the Model Context Protocol to the server process over
//!   stdio and classifies what the server sends back.
//! - [`api`] defines the chat-completion payloads.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod mcp;

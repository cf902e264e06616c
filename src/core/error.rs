//! Error taxonomy shared by the session, the transport and the model client.

use std::error::Error as StdError;
use std::fmt;

/// Failures surfaced by the collaborators the orchestration loop talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The tool server process or connection could not be established.
    Connection(String),
    /// The MCP handshake or a protocol exchange did not complete.
    Protocol(String),
    /// A single tool invocation failed, or its arguments could not be decoded.
    Tool { name: String, message: String },
    /// The chat completion API rejected or failed a request.
    Api { status: Option<u16>, message: String },
}

impl SessionError {
    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        SessionError::Tool {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Connection(msg) => write!(f, "Connection failed: {msg}"),
            SessionError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            SessionError::Tool { name, message } => {
                write!(f, "Error executing tool {name}: {message}")
            }
            SessionError::Api {
                status: Some(status),
                message,
            } => write!(f, "API request failed with status {status}: {message}"),
            SessionError::Api {
                status: None,
                message,
            } => write!(f, "API request failed: {message}"),
        }
    }
}

impl StdError for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_names_the_tool() {
        let err = SessionError::tool("get_weather", "city not found");
        assert_eq!(
            err.to_string(),
            "Error executing tool get_weather: city not found"
        );
    }

    #[test]
    fn api_error_includes_status_when_known() {
        let err = SessionError::Api {
            status: Some(401),
            message: "invalid key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API request failed with status 401: invalid key"
        );

        let err = SessionError::Api {
            status: None,
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "API request failed: connection reset");
    }
}

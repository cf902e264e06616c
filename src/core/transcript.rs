//! Append-only conversation history fed to every model call.

use crate::api::{ChatMessage, ChatToolCall};

/// A tool call the model asked for. `arguments` is the raw JSON text the model
/// produced; it is decoded only when the call is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocationRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
}

impl ToolInvocationRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
        }
    }
}

impl From<ChatToolCall> for ToolInvocationRequest {
    fn from(call: ChatToolCall) -> Self {
        Self {
            call_id: call.id,
            tool_name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        tool_calls: Vec<ToolInvocationRequest>,
    },
    Tool {
        call_id: String,
        tool_name: String,
        content: String,
    },
}

impl Turn {
    pub fn to_api_message(&self) -> ChatMessage {
        match self {
            Turn::System { content } => ChatMessage::system(content),
            Turn::User { content } => ChatMessage::user(content),
            Turn::Assistant {
                content,
                tool_calls,
            } => ChatMessage::assistant(
                content,
                tool_calls
                    .iter()
                    .map(|call| {
                        ChatToolCall::function(&call.call_id, &call.tool_name, &call.arguments)
                    })
                    .collect(),
            ),
            Turn::Tool {
                call_id,
                tool_name,
                content,
            } => ChatMessage::tool_result(call_id, tool_name, content),
        }
    }
}

/// Ordered history whose first turn is always the system turn.
///
/// Only the system turn can change after it was stored; every other turn is
/// appended once and never touched again. Tool results are accepted only
/// directly after the assistant turn that requested them, in request order.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(system_content: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::System {
                content: system_content.into(),
            }],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_content(&self) -> &str {
        match &self.turns[0] {
            Turn::System { content } => content,
            _ => unreachable!("transcript always starts with a system turn"),
        }
    }

    pub fn replace_system(&mut self, content: impl Into<String>) {
        self.turns[0] = Turn::System {
            content: content.into(),
        };
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::User {
            content: content.into(),
        });
    }

    pub fn push_assistant(
        &mut self,
        content: impl Into<String>,
        tool_calls: Vec<ToolInvocationRequest>,
    ) {
        self.turns.push(Turn::Assistant {
            content: content.into(),
            tool_calls,
        });
    }

    /// Appends the result of `call_id`.
    ///
    /// Fails when the call does not belong to the latest assistant turn, or
    /// when it would land before a result that is already recorded for a later
    /// request. Skipping a failed call is allowed.
    pub fn push_tool_result(
        &mut self,
        call_id: &str,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), String> {
        let mut last_recorded: Option<&str> = None;
        let mut requested: Option<&[ToolInvocationRequest]> = None;
        for turn in self.turns.iter().rev() {
            match turn {
                Turn::Tool {
                    call_id: recorded, ..
                } => {
                    if last_recorded.is_none() {
                        last_recorded = Some(recorded);
                    }
                }
                Turn::Assistant { tool_calls, .. } => {
                    requested = Some(tool_calls);
                    break;
                }
                _ => break,
            }
        }

        let Some(requested) = requested else {
            return Err(format!(
                "Tool result {call_id} does not follow an assistant turn."
            ));
        };
        let Some(position) = requested.iter().position(|call| call.call_id == call_id) else {
            return Err(format!(
                "Tool result {call_id} was not requested by the latest assistant turn."
            ));
        };
        if let Some(previous) = last_recorded {
            let previous_position = requested
                .iter()
                .position(|call| call.call_id == previous)
                .unwrap_or(0);
            if position <= previous_position {
                return Err(format!(
                    "Tool result {call_id} is out of request order."
                ));
            }
        }

        self.turns.push(Turn::Tool {
            call_id: call_id.to_string(),
            tool_name: tool_name.into(),
            content: content.into(),
        });
        Ok(())
    }

    pub fn to_api_messages(&self) -> Vec<ChatMessage> {
        self.turns.iter().map(Turn::to_api_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant_with_calls(transcript: &mut Transcript, ids: &[&str]) {
        transcript.push_assistant(
            "",
            ids.iter()
                .map(|id| ToolInvocationRequest::new(*id, format!("tool_{id}"), "{}"))
                .collect(),
        );
    }

    #[test]
    fn starts_with_system_turn() {
        let transcript = Transcript::new("be helpful");
        assert_eq!(transcript.turns().len(), 1);
        assert_eq!(transcript.system_content(), "be helpful");
        assert!(matches!(transcript.turns()[0], Turn::System { .. }));
    }

    #[test]
    fn replace_system_keeps_position_and_length() {
        let mut transcript = Transcript::new("old");
        transcript.push_user("hello");
        transcript.replace_system("new");
        assert_eq!(transcript.turns().len(), 2);
        assert_eq!(transcript.system_content(), "new");
        assert_eq!(
            transcript.turns()[1],
            Turn::User {
                content: "hello".to_string()
            }
        );
    }

    #[test]
    fn tool_results_accepted_in_request_order() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("q");
        assistant_with_calls(&mut transcript, &["c1", "c2", "c3"]);

        assert!(transcript.push_tool_result("c1", "tool_c1", "one").is_ok());
        assert!(transcript.push_tool_result("c3", "tool_c3", "three").is_ok());
        assert!(transcript.push_tool_result("c2", "tool_c2", "two").is_err());
        assert_eq!(transcript.turns().len(), 5);
    }

    #[test]
    fn tool_result_must_match_latest_assistant_turn() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("q");
        assert!(transcript.push_tool_result("c1", "t", "x").is_err());

        assistant_with_calls(&mut transcript, &["c1"]);
        assert!(transcript.push_tool_result("zz", "t", "x").is_err());
        assert!(transcript.push_tool_result("c1", "t", "x").is_ok());
        assert!(transcript.push_tool_result("c1", "t", "x").is_err());
    }

    #[test]
    fn api_messages_mirror_turns() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("weather?");
        transcript.push_assistant(
            "checking",
            vec![ToolInvocationRequest::new(
                "c1",
                "get_weather",
                r#"{"city":"Paris"}"#,
            )],
        );
        transcript
            .push_tool_result("c1", "get_weather", "22C, sunny")
            .unwrap();

        let messages = transcript.to_api_messages();
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);

        let calls = messages[2].tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.arguments, r#"{"city":"Paris"}"#);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(messages[3].name.as_deref(), Some("get_weather"));
    }
}

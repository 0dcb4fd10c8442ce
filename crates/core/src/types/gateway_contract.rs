use serde::{Deserialize, Serialize};

/// Client → server message on the agent socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEnvelope {
    /// Free-form task handed to the orchestration loop.
    Conversation(String),
    /// Direct tool dispatch.
    ToolExec(ToolExecRequest),
}

/// Payload of a `tool_exec` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecRequest {
    pub tool: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ClientEnvelope {
    /// Parse a text frame. Text that is not an envelope is treated as a task.
    pub fn from_text(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self::Conversation(text.to_string()))
    }
}

/// Kind of a server → client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessageKind {
    Status,
    Output,
    Error,
}

/// Server → client message on the agent socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: ServerMessageKind,
    pub payload: String,
}

impl ServerMessage {
    pub fn status(payload: impl Into<String>) -> Self {
        Self {
            kind: ServerMessageKind::Status,
            payload: payload.into(),
        }
    }

    pub fn output(payload: impl Into<String>) -> Self {
        Self {
            kind: ServerMessageKind::Output,
            payload: payload.into(),
        }
    }

    pub fn error(payload: impl Into<String>) -> Self {
        Self {
            kind: ServerMessageKind::Error,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_exec_envelope() {
        let env = ClientEnvelope::from_text(
            r#"{"type":"tool_exec","payload":{"tool":"shell_exec","args":["echo hello"]}}"#,
        );
        assert_eq!(
            env,
            ClientEnvelope::ToolExec(ToolExecRequest {
                tool: "shell_exec".into(),
                args: vec!["echo hello".into()],
            })
        );
    }

    #[test]
    fn test_parse_conversation_envelope() {
        let env = ClientEnvelope::from_text(r#"{"type":"conversation","payload":"list files"}"#);
        assert_eq!(env, ClientEnvelope::Conversation("list files".into()));
    }

    #[test]
    fn test_raw_text_is_conversation() {
        let env = ClientEnvelope::from_text("hello there");
        assert_eq!(env, ClientEnvelope::Conversation("hello there".into()));
    }

    #[test]
    fn test_server_message_shape() {
        let json = serde_json::to_value(ServerMessage::error("boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"], "boom");
    }
}

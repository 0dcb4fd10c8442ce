use serde::{Deserialize, Serialize};

use super::tool::CONVERSATION_TOOL;

// =============================================================================
// Planner Decision
// =============================================================================

/// One planner turn: which tool to call and with which arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDecision {
    /// Tool name (`conversation` ends the loop).
    pub tool: String,
    /// Ordered string arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl AgentDecision {
    /// Create a tool call decision.
    pub fn call(tool: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    /// Create a terminal conversational decision carrying a message.
    pub fn conversation(message: impl Into<String>) -> Self {
        Self {
            tool: CONVERSATION_TOOL.to_string(),
            args: vec![message.into()],
        }
    }

    /// Whether this decision ends the loop.
    pub fn is_conversation(&self) -> bool {
        self.tool == CONVERSATION_TOOL
    }

    /// Human-readable description used in history and transcripts.
    pub fn describe(&self) -> String {
        format!("{} with args: {:?}", self.tool, self.args)
    }
}

// =============================================================================
// Turn History
// =============================================================================

/// Summary of one executed turn, fed back into the next planner prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 1-based turn index.
    pub index: usize,
    /// What was attempted.
    pub command_description: String,
    /// Compact outcome summary.
    pub summary: String,
}

impl TurnRecord {
    /// Render as a single history line.
    pub fn render(&self) -> String {
        format!("Step {}: {}", self.index, self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_deserialize_without_args() {
        let d: AgentDecision = serde_json::from_str(r#"{"tool": "file_list"}"#).unwrap();
        assert_eq!(d.tool, "file_list");
        assert!(d.args.is_empty());
    }

    #[test]
    fn test_conversation_decision() {
        let d = AgentDecision::conversation("all done");
        assert!(d.is_conversation());
        assert_eq!(d.args, vec!["all done".to_string()]);
    }

    #[test]
    fn test_turn_render() {
        let t = TurnRecord {
            index: 3,
            command_description: "shell_exec with args: [\"pwd\"]".into(),
            summary: "Action 'shell_exec' succeeded.".into(),
        };
        assert_eq!(t.render(), "Step 3: Action 'shell_exec' succeeded.");
    }
}

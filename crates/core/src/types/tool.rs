use serde::{Deserialize, Serialize};

/// Tool definition for the tool registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,
}

/// Tool name reserved for terminal, non-tool planner responses.
pub const CONVERSATION_TOOL: &str = "conversation";

/// Tool name of the recursive orchestrator.
pub const AUTONOMOUS_EXECUTION_TOOL: &str = "autonomous_execution";

//! Built-in tools.

use async_trait::async_trait;

use shellpilot_core::{traits::Tool, types::CONVERSATION_TOOL, Result};

// =============================================================================
// Conversation Tool
// =============================================================================

/// Sends a message back to the user. As a planner decision it ends the
/// orchestration loop.
pub struct ConversationTool;

#[async_trait]
impl Tool for ConversationTool {
    fn name(&self) -> &str {
        CONVERSATION_TOOL
    }

    fn description(&self) -> &str {
        "Sends a message to the user: ask for clarification, report a problem you \
         cannot solve, or signal that the task is complete. The arguments are the message."
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        if args.is_empty() {
            return Ok("Error: missing message to send.".to_string());
        }
        Ok(args.join(" "))
    }
}

//! Single-turn dispatch for free-form requests.
//!
//! One planner call over the full tool listing either answers directly or
//! picks exactly one tool call. Multi-step work is reached through the
//! `autonomous_execution` tool, which runs the full loop.

use tokio_util::sync::CancellationToken;

use shellpilot_core::{types::AgentDecision, Result};

use crate::orchestrator::Orchestrator;
use crate::parser::parse_decision;

/// What the planner chose for a free-form request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A direct answer; no tool runs.
    Reply(String),
    /// A single tool call.
    Call(AgentDecision),
}

impl Orchestrator {
    /// Ask the planner once how to handle `request`.
    ///
    /// Malformed planner output becomes a reply carrying the raw text.
    pub async fn decide(&self, request: &str, cancel: &CancellationToken) -> Result<Dispatch> {
        let listing = self.tools.describe().await?;
        let prompt = build_dispatch_prompt(request, &listing);
        tracing::debug!(prompt_len = prompt.len(), "Planning single dispatch");

        let raw = self.cancellable(cancel, self.llm.complete(&prompt)).await?.content;
        let decision = parse_decision(&raw);
        tracing::debug!(tool = %decision.tool, "Dispatch decision");

        Ok(if decision.is_conversation() {
            Dispatch::Reply(decision.args.join(" "))
        } else {
            Dispatch::Call(decision)
        })
    }

    /// Run one planner-chosen tool call and return its raw output.
    ///
    /// Any registered tool may run here, including `autonomous_execution`.
    /// An unregistered name fails with `Error::ToolNotFound`.
    pub async fn dispatch(&self, call: &AgentDecision, cancel: &CancellationToken) -> Result<String> {
        tracing::info!(command = %call.describe(), "Dispatching");
        self.cancellable(cancel, self.tools.execute(&call.tool, &call.args))
            .await
    }
}

/// Planner prompt for a single dispatch.
pub fn build_dispatch_prompt(request: &str, listing: &str) -> String {
    format!(
        r#"You are a helpful AI assistant working in a Linux sandbox. Your goal is to accomplish the user's task by thinking step-by-step and using the available tools. You can chain commands together to solve complex problems.
1. **Think**: Analyze the user's request and create a plan.
2. **Act**: Choose the best tool for the current step in your plan.

You have access to the following tools:
{listing}

If the user's request is a greeting or a conversational question that does not require a tool, respond with {{"tool": "conversation", "args": ["Your conversational response here"]}}.
If the task needs several steps, respond with {{"tool": "autonomous_execution", "args": ["<the user's task>"]}}.
Otherwise, respond with ONLY a JSON object in the format: {{"tool": "tool_name", "args": ["arg1", "arg2"]}}.

User Task: {request}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_prompt_embeds_listing_and_task() {
        let prompt = build_dispatch_prompt("list files", "- file_list: Lists files.");
        assert!(prompt.contains("- file_list: Lists files.\n"));
        assert!(prompt.ends_with("User Task: list files"));
        assert!(prompt.contains(r#"{"tool": "autonomous_execution", "args": ["<the user's task>"]}"#));
    }
}

//! Autonomous orchestration loop.
//!
//! The loop is a small state machine:
//! 1. Plan: prompt the planner with the request, the turn history and the
//!    visible tool listing
//! 2. Parse the response into a decision (`conversation` ends the loop)
//! 3. Execute the chosen tool and fold a summary into history
//! 4. Repeat until done or the turn budget runs out
//!
//! Failed commands are observations, not errors: the planner sees them and
//! can recover on the next turn.

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use shellpilot_core::{
    config::OrchestratorConfig,
    traits::{render_listing, LlmClient, Tool, ToolRegistry},
    types::{AgentDecision, ToolDefinition, TurnRecord, AUTONOMOUS_EXECUTION_TOOL},
    Error, Result,
};

use crate::parser::parse_decision;

const MAX_TURNS_NOTICE: &str = "\nAgent reached maximum turns. Task may be incomplete.";
const COMPLETED_PREFIX: &str = "\nAgent has completed the task: ";

/// How an orchestration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The planner chose `conversation`.
    Completed,
    /// The turn budget ran out first.
    Exhausted,
}

impl Termination {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Result of one orchestration.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Cumulative client-facing transcript.
    pub transcript: String,
    pub termination: Termination,
    /// Planning cycles that executed (or tried to execute) a tool.
    pub turns: usize,
    pub history: Vec<TurnRecord>,
}

/// Drives the planner and the tool registry until the task is done.
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) tools: Arc<dyn ToolRegistry>,
    pub(crate) shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create a new builder for Orchestrator.
    pub fn builder() -> crate::builder::OrchestratorBuilder {
        crate::builder::OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<dyn ToolRegistry> {
        &self.tools
    }

    /// Token cancelled on process shutdown. Per-session tokens should be
    /// children of it.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// The `autonomous_execution` tool backed by this orchestrator.
    pub fn autonomous_tool(self: &Arc<Self>) -> Arc<dyn Tool> {
        Arc::new(crate::autonomous::AutonomousExecutionTool::new(Arc::downgrade(self)))
    }

    /// Whether the planner may see and call `name`.
    ///
    /// The loop never offers itself (recursion), nor tools the config marks
    /// as privileged (container control, key generation).
    pub fn is_visible(&self, name: &str) -> bool {
        name != AUTONOMOUS_EXECUTION_TOOL
            && !self.config.excluded_tools.iter().any(|t| t == name)
            && !self
                .config
                .excluded_prefixes
                .iter()
                .any(|p| name.starts_with(p.as_str()))
    }

    /// Tools offered to the planner, in registration order.
    pub async fn planner_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self
            .tools
            .list()
            .await?
            .into_iter()
            .filter(|d| self.is_visible(&d.name))
            .collect())
    }

    /// Run the loop for `request`.
    ///
    /// Returns an error only for planner transport failures or cancellation;
    /// tool failures and an exhausted budget are reported in the transcript.
    pub async fn run(&self, request: &str, cancel: &CancellationToken) -> Result<Outcome> {
        let listing = render_listing(&self.planner_tools().await?);
        let mut history: Vec<TurnRecord> = Vec::new();
        let mut transcript = String::new();

        tracing::info!(
            max_turns = self.config.max_turns,
            request_len = request.len(),
            "Starting autonomous execution"
        );

        for index in 1..=self.config.max_turns {
            let prompt = build_prompt(request, &history, &listing);
            tracing::debug!(turn = index, prompt_len = prompt.len(), "Planning");

            let raw = match self.cancellable(cancel, self.llm.complete(&prompt)).await {
                Ok(response) => response.content,
                Err(e) => {
                    tracing::warn!(turn = index, error = %e, "Planner call failed, aborting orchestration");
                    shellpilot_telemetry::track_orchestration("failed", index - 1);
                    return Err(e);
                }
            };

            let decision = parse_decision(&raw);
            tracing::debug!(turn = index, tool = %decision.tool, "Planner decision");

            if decision.is_conversation() {
                transcript.push_str(COMPLETED_PREFIX);
                transcript.push_str(&decision.args.join(" "));
                tracing::info!(turns = index - 1, "Agent completed the task");
                shellpilot_telemetry::track_orchestration(Termination::Completed.as_str(), index - 1);
                return Ok(Outcome {
                    transcript,
                    termination: Termination::Completed,
                    turns: index - 1,
                    history,
                });
            }

            shellpilot_telemetry::track_turn();
            let record = self.execute_turn(index, &decision, &mut transcript, cancel).await?;
            history.push(record);
        }

        transcript.push_str(MAX_TURNS_NOTICE);
        tracing::warn!(max_turns = self.config.max_turns, "Agent reached maximum turns");
        shellpilot_telemetry::track_orchestration(Termination::Exhausted.as_str(), self.config.max_turns);
        Ok(Outcome {
            transcript,
            termination: Termination::Exhausted,
            turns: self.config.max_turns,
            history,
        })
    }

    async fn execute_turn(
        &self,
        index: usize,
        decision: &AgentDecision,
        transcript: &mut String,
        cancel: &CancellationToken,
    ) -> Result<TurnRecord> {
        let description = decision.describe();

        let known = self.is_visible(&decision.tool) && self.tools.get(&decision.tool).await?.is_some();
        if !known {
            tracing::warn!(turn = index, tool = %decision.tool, "Planner requested unavailable tool");
            let summary = format!("Error: Tool '{}' not found.", decision.tool);
            transcript.push_str(&format!("Step {}: {}\n\n", index, summary));
            return Ok(TurnRecord {
                index,
                command_description: description,
                summary,
            });
        }

        tracing::info!(turn = index, command = %description, "Executing");
        let started = Instant::now();
        let result = self
            .cancellable(cancel, self.tools.execute(&decision.tool, &decision.args))
            .await;

        let (output, summary) = match result {
            Ok(output) => {
                let summary = summarize(&description, &output, None);
                (output, summary)
            }
            Err(Error::Cancelled(reason)) => return Err(Error::Cancelled(reason)),
            Err(e) => {
                // A failed command is still output worth showing.
                let output = if e.is_command_failure() { e.to_string() } else { String::new() };
                (output, summarize(&description, "", Some(&e)))
            }
        };

        tracing::debug!(
            turn = index,
            output_len = output.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn finished"
        );

        transcript.push_str(&format!(
            "Step {}: Executed {}\nOutput: {}\n\n",
            index, description, output
        ));

        Ok(TurnRecord {
            index,
            command_description: description,
            summary,
        })
    }

    pub(crate) async fn cancellable<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled("orchestration cancelled".into())),
            res = fut => res,
        }
    }
}

/// Compact one-line outcome for the planner's history.
pub fn summarize(description: &str, output: &str, error: Option<&Error>) -> String {
    match error {
        Some(e) => format!("Action '{}' failed with error: {}", description, e),
        None if !output.is_empty() => {
            format!("Action '{}' succeeded with output: {}", description, output)
        }
        None => format!("Action '{}' succeeded.", description),
    }
}

/// Planner prompt for one turn.
pub fn build_prompt(request: &str, history: &[TurnRecord], listing: &str) -> String {
    let history = history
        .iter()
        .map(|t| format!("{}\n", t.render()))
        .collect::<String>();

    format!(
        r#"You are an autonomous AI agent. Your goal is to complete the user's request by executing a series of commands. Think step-by-step and use the available tools to solve the problem. If you encounter an error, analyze it and try to recover.

Original user request: "{request}"

Here is the history of the actions you have taken so far:
{history}

Available tools:
{listing}

**Your Task:**
1.  **Analyze**: Based on the history of commands and their output, determine the single next best action to get closer to completing the original request.
2.  **Act**: Choose one tool to execute. Use 'shell_exec' for all terminal commands, including 'cd', 'ls', 'git', etc. The shell is stateful; 'cd' will change the directory for all subsequent commands.
3.  **Recover**: If a command fails, analyze the error message in the history and decide on a recovery step.
4.  **Converse**: If you are stuck, need more information, or have completed the task, use the 'conversation' tool to communicate with the user.

Respond ONLY with a single, valid JSON object in the format: {{"tool": "<tool_name>", "args": ["<arg1>"]}}."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_variants() {
        assert_eq!(
            summarize("shell_exec with args: [\"true\"]", "", None),
            "Action 'shell_exec with args: [\"true\"]' succeeded."
        );
        assert_eq!(
            summarize("file_list with args: []", "a.txt", None),
            "Action 'file_list with args: []' succeeded with output: a.txt"
        );
        let err = Error::command_failed("1", "");
        assert_eq!(
            summarize("x", "", Some(&err)),
            "Action 'x' failed with error: command exited with non-zero status 1: "
        );
    }

    #[test]
    fn test_prompt_embeds_request_history_and_listing() {
        let history = vec![TurnRecord {
            index: 1,
            command_description: "shell_exec with args: [\"pwd\"]".into(),
            summary: "Action 'shell_exec' succeeded with output: /home/developer".into(),
        }];
        let prompt = build_prompt("find the repo", &history, "- shell_exec: Runs commands");

        assert!(prompt.contains("Original user request: \"find the repo\""));
        assert!(prompt.contains("Step 1: Action 'shell_exec' succeeded with output: /home/developer\n"));
        assert!(prompt.contains("- shell_exec: Runs commands"));
        assert!(prompt.contains(r#"{"tool": "<tool_name>", "args": ["<arg1>"]}"#));
    }
}

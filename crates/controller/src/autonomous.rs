//! The orchestration loop exposed as a tool.

use async_trait::async_trait;
use std::sync::Weak;

use shellpilot_core::{traits::Tool, types::AUTONOMOUS_EXECUTION_TOOL, Error, Result};

use crate::orchestrator::Orchestrator;

/// Runs a multi-step task through the [`Orchestrator`].
///
/// Holds a weak handle: the orchestrator owns the registry that owns this
/// tool.
pub struct AutonomousExecutionTool {
    orchestrator: Weak<Orchestrator>,
}

impl AutonomousExecutionTool {
    pub fn new(orchestrator: Weak<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for AutonomousExecutionTool {
    fn name(&self) -> &str {
        AUTONOMOUS_EXECUTION_TOOL
    }

    fn description(&self) -> &str {
        "Executes a sequence of tool calls to achieve a complex goal. Use this for multi-step tasks. The first argument must be the user's original request. Usage: autonomous_execution \"<user_request>\""
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        let Some(request) = args.first() else {
            return Ok(
                "Error: autonomous_execution requires the user's original request as the first argument."
                    .to_string(),
            );
        };

        let orchestrator = self
            .orchestrator
            .upgrade()
            .ok_or_else(|| Error::internal("orchestrator has been shut down"))?;

        let cancel = orchestrator.shutdown_token().child_token();
        let outcome = orchestrator.run(request, &cancel).await?;
        Ok(outcome.transcript)
    }
}

//! Mock implementations of core traits for testing.
//!
//! Used by the controller and gateway test suites so they can run without a
//! language model or a container runtime.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::{
    traits::{LlmClient, LlmResponse, LlmUsage, Tool},
    Error, Result,
};

// =============================================================================
// Mock LLM Client
// =============================================================================

/// Scripted mock LLM that returns predefined responses in order.
///
/// Once the script is exhausted the last response is repeated.
pub struct MockLlm {
    responses: Vec<String>,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl MockLlm {
    /// Create a new mock LLM with a queue of responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            prompts: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Create a mock that always returns the same response.
    pub fn constant(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    /// Create a mock whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    /// Number of calls made to this mock.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        let idx = {
            let mut prompts = self
                .prompts
                .lock()
                .map_err(|_| Error::internal("mock llm lock poisoned"))?;
            prompts.push(prompt.to_string());
            prompts.len() - 1
        };

        if self.fail {
            return Err(Error::planner("mock planner unavailable"));
        }

        let content = self
            .responses
            .get(idx)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();

        Ok(LlmResponse {
            usage: LlmUsage::estimate(prompt, &content),
            content,
            finish_reason: "stop".to_string(),
        })
    }
}

// =============================================================================
// Mock Tool
// =============================================================================

/// Tool that records every call and answers from a fixed outcome.
pub struct MockTool {
    name: String,
    description: String,
    outcome: MockOutcome,
    calls: Mutex<Vec<Vec<String>>>,
}

#[derive(Clone)]
enum MockOutcome {
    Echo,
    Output(String),
    CommandFailed(String, String),
    Error(String),
}

impl MockTool {
    /// Tool that returns its arguments joined by spaces.
    pub fn echo(name: &str) -> Arc<Self> {
        Self::build(name, MockOutcome::Echo)
    }

    /// Tool that always returns `output`.
    pub fn returning(name: &str, output: &str) -> Arc<Self> {
        Self::build(name, MockOutcome::Output(output.to_string()))
    }

    /// Tool that reports a non-zero exit status.
    pub fn exit_status(name: &str, code: &str, stderr: &str) -> Arc<Self> {
        Self::build(
            name,
            MockOutcome::CommandFailed(code.to_string(), stderr.to_string()),
        )
    }

    /// Tool that fails with a tool execution error.
    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        Self::build(name, MockOutcome::Error(message.to_string()))
    }

    /// Override the description.
    pub fn with_description(self: Arc<Self>, description: &str) -> Arc<Self> {
        Arc::new(Self {
            name: self.name.clone(),
            description: description.to_string(),
            outcome: self.outcome.clone(),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Arguments of every call made so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn build(name: &str, outcome: MockOutcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            description: format!("Mock tool {}", name),
            outcome,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(args.to_vec());
        }
        match &self.outcome {
            MockOutcome::Echo => Ok(args.join(" ")),
            MockOutcome::Output(out) => Ok(out.clone()),
            MockOutcome::CommandFailed(code, stderr) => Err(Error::command_failed(code, stderr)),
            MockOutcome::Error(msg) => Err(Error::tool_execution(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_llm_script_repeats_last() {
        let llm = MockLlm::new(vec!["a".into(), "b".into()]);
        assert_eq!(llm.complete("1").await.unwrap().content, "a");
        assert_eq!(llm.complete("2").await.unwrap().content, "b");
        assert_eq!(llm.complete("3").await.unwrap().content, "b");
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.prompts()[2], "3");
    }

    #[tokio::test]
    async fn test_mock_tool_records_calls() {
        let tool = MockTool::echo("shell_exec");
        let out = tool.execute(&["echo".into(), "hi".into()]).await.unwrap();
        assert_eq!(out, "echo hi");
        assert_eq!(tool.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_tool_exit_status() {
        let tool = MockTool::exit_status("shell_exec", "1", "boom");
        let err = tool.execute(&[]).await.unwrap_err();
        assert!(err.is_command_failure());
    }
}

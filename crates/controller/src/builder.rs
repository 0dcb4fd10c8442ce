//! Builder for Orchestrator.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use shellpilot_core::{
    config::OrchestratorConfig,
    traits::{LlmClient, ToolRegistry},
    Error, Result,
};

use crate::orchestrator::Orchestrator;

/// Builder for constructing an Orchestrator.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    llm: Option<Arc<dyn LlmClient>>,
    tools: Option<Arc<dyn ToolRegistry>>,
    shutdown: Option<CancellationToken>,
    register_self: bool,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            llm: None,
            tools: None,
            shutdown: None,
            register_self: true,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the planner client.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the tool registry.
    pub fn with_tools(mut self, tools: Arc<dyn ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set the process shutdown token.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Skip registering `autonomous_execution` into the registry.
    pub fn without_autonomous_tool(mut self) -> Self {
        self.register_self = false;
        self
    }

    /// Build the orchestrator and register its `autonomous_execution` tool.
    pub async fn build(self) -> Result<Arc<Orchestrator>> {
        let llm = self
            .llm
            .ok_or_else(|| Error::Config("orchestrator requires a planner client".into()))?;
        let tools = self
            .tools
            .ok_or_else(|| Error::Config("orchestrator requires a tool registry".into()))?;
        if self.config.max_turns == 0 {
            return Err(Error::Config("orchestrator.max_turns must be at least 1".into()));
        }

        let orchestrator = Arc::new(Orchestrator {
            config: self.config,
            llm,
            tools,
            shutdown: self.shutdown.unwrap_or_default(),
        });

        if self.register_self {
            orchestrator
                .tools
                .register(orchestrator.autonomous_tool())
                .await?;
        }

        tracing::debug!(max_turns = orchestrator.config.max_turns, "Orchestrator built");
        Ok(orchestrator)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

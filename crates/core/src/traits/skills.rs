//! Tool traits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::ToolDefinition;

/// A capability the agent can invoke by name.
///
/// Arguments are an ordered list of strings, exactly as the planner emits
/// them. A tool returns its textual output, or an error which callers render
/// back to the client.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of the tool.
    fn name(&self) -> &str;

    /// Get the human-readable description.
    fn description(&self) -> &str;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: &[String]) -> Result<String>;
}

/// Tool registry for managing available tools.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Register a tool, replacing any tool already registered under the same name.
    async fn register(&self, tool: Arc<dyn Tool>) -> Result<()>;

    /// Get a tool by name.
    async fn get(&self, name: &str) -> Result<Option<Arc<dyn Tool>>>;

    /// List all tools in registration order.
    async fn list(&self) -> Result<Vec<ToolDefinition>>;

    /// Execute a tool by name with arguments.
    async fn execute(&self, name: &str, args: &[String]) -> Result<String>;

    /// Render the `- name: description` listing used inside planner prompts.
    async fn describe(&self) -> Result<String> {
        Ok(render_listing(&self.list().await?))
    }
}

/// Render tool definitions as newline-joined `- name: description` lines.
pub fn render_listing(definitions: &[ToolDefinition]) -> String {
    definitions
        .iter()
        .map(|d| format!("- {}: {}", d.name, d.description))
        .collect::<Vec<_>>()
        .join("\n")
}

//! Tool registry implementation.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use shellpilot_core::{
    traits::{Tool, ToolRegistry},
    types::ToolDefinition,
    Error, Result,
};

struct ToolEntry {
    tool: Arc<dyn Tool>,
    /// Registration slot, used only to order listings.
    seq: u64,
}

/// Default tool registry using DashMap.
///
/// Lookup is by name; `list` and `describe` follow registration order. Re-registering a
/// name replaces the tool but keeps its original slot.
pub struct DefaultToolRegistry {
    tools: DashMap<String, ToolEntry>,
    next_seq: AtomicU64,
}

impl DefaultToolRegistry {
    /// Create a new tool registry.
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create a registry pre-populated with `tools`.
    pub async fn with_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self> {
        let registry = Self::new();
        for tool in tools {
            registry.register(tool).await?;
        }
        Ok(registry)
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for DefaultToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for DefaultToolRegistry {
    async fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();

        match self.tools.entry(name) {
            Entry::Occupied(mut entry) => {
                tracing::info!(tool = %entry.key(), "Replacing tool");
                entry.get_mut().tool = tool;
            }
            Entry::Vacant(entry) => {
                tracing::info!(tool = %entry.key(), "Registering tool");
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                entry.insert(ToolEntry { tool, seq });
            }
        }
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn Tool>>> {
        Ok(self.tools.get(name).map(|entry| entry.tool.clone()))
    }

    async fn list(&self) -> Result<Vec<ToolDefinition>> {
        let mut entries: Vec<(u64, ToolDefinition)> = self
            .tools
            .iter()
            .map(|entry| {
                (
                    entry.seq,
                    ToolDefinition {
                        name: entry.tool.name().to_string(),
                        description: entry.tool.description().to_string(),
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);

        Ok(entries.into_iter().map(|(_, def)| def).collect())
    }

    async fn execute(&self, name: &str, args: &[String]) -> Result<String> {
        // Clone out of the map so no shard lock is held across the await.
        let tool = self
            .get(name)
            .await?
            .ok_or_else(|| Error::tool_not_found(name))?;

        tracing::debug!(tool = %name, args = ?args, "Executing tool");
        let started = Instant::now();
        let result = tool.execute(args).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) if e.is_command_failure() => "command_failed",
            Err(_) => "error",
        };
        shellpilot_telemetry::track_tool(name, outcome, elapsed);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::ConversationTool;
    use shellpilot_core::mocks::MockTool;

    #[tokio::test]
    async fn test_register_and_list() {
        let registry = DefaultToolRegistry::new();

        registry.register(Arc::new(ConversationTool)).await.unwrap();

        let tools = registry.list().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "conversation");
    }

    #[tokio::test]
    async fn test_list_follows_registration_order() {
        let registry = DefaultToolRegistry::new();
        for name in ["shell_exec", "file_read", "file_write", "file_list"] {
            registry.register(MockTool::echo(name)).await.unwrap();
        }

        let names: Vec<_> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["shell_exec", "file_read", "file_write", "file_list"]);
    }

    #[tokio::test]
    async fn test_register_overwrites_same_name() {
        let registry = DefaultToolRegistry::new();
        registry.register(MockTool::returning("a", "first")).await.unwrap();
        registry.register(MockTool::echo("b")).await.unwrap();
        registry.register(MockTool::returning("a", "second")).await.unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.execute("a", &[]).await.unwrap(), "second");
        assert_eq!(registry.list().await.unwrap()[0].name, "a");
    }

    #[tokio::test]
    async fn test_execute() {
        let registry = DefaultToolRegistry::new();
        registry.register(Arc::new(ConversationTool)).await.unwrap();

        let result = registry
            .execute("conversation", &["Hello".to_string()])
            .await
            .unwrap();
        assert_eq!(result, "Hello");
    }

    #[tokio::test]
    async fn test_execute_not_found() {
        let registry = DefaultToolRegistry::new();

        let result = registry.execute("nonexistent", &[]).await;

        assert!(matches!(result, Err(Error::ToolNotFound(_))));
        assert!(registry.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_describe_renders_listing() {
        let registry = DefaultToolRegistry::new();
        registry
            .register(MockTool::echo("shell_exec").with_description("Runs a command."))
            .await
            .unwrap();
        registry
            .register(MockTool::echo("file_list").with_description("Lists files."))
            .await
            .unwrap();

        assert_eq!(
            registry.describe().await.unwrap(),
            "- shell_exec: Runs a command.\n- file_list: Lists files."
        );
    }
}

//! End-to-end wiring: registry + sandbox + orchestrator + gateway session,
//! with a scripted planner and the in-process container runtime.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use shellpilot_controller::{Orchestrator, Termination};
use shellpilot_core::config::SandboxSettings;
use shellpilot_core::traits::{LlmClient, LlmResponse, LlmUsage, ToolRegistry};
use shellpilot_sandbox::{sandbox_tools, ContainerManager, ContainerState, MockRuntime, ShellChannel};
use shellpilot_skills::{ConversationTool, DefaultToolRegistry};

// =============================================================================
// Scripted planner
// =============================================================================

struct ScriptedPlanner {
    responses: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    fn new(responses: Vec<serde_json::Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|v| v.to_string()).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedPlanner {
    async fn complete(&self, _prompt: &str) -> shellpilot_core::Result<LlmResponse> {
        let mut responses = self.responses.lock().unwrap();
        let content = if responses.is_empty() {
            r#"{"tool": "conversation", "args": ["Out of script."]}"#.to_string()
        } else {
            responses.remove(0)
        };
        Ok(LlmResponse {
            content,
            finish_reason: "stop".to_string(),
            usage: LlmUsage::default(),
        })
    }
}

struct System {
    runtime: Arc<MockRuntime>,
    manager: Arc<ContainerManager>,
    tools: Arc<DefaultToolRegistry>,
    orchestrator: Arc<Orchestrator>,
}

async fn system(planner: ScriptedPlanner, test: &str) -> System {
    let shutdown = CancellationToken::new();
    let runtime = Arc::new(MockRuntime::new());
    let settings = SandboxSettings {
        host_dir: std::env::temp_dir()
            .join(format!("shellpilot-sys-{}-{}", test, std::process::id()))
            .display()
            .to_string(),
        ..Default::default()
    };
    let manager = Arc::new(ContainerManager::new(runtime.clone(), settings, shutdown.clone()));
    manager.ensure_running().await.unwrap();

    let channel = Arc::new(ShellChannel::new(manager.clone()));
    let tools = Arc::new(DefaultToolRegistry::with_tools(sandbox_tools(channel)).await.unwrap());
    tools.register(Arc::new(ConversationTool)).await.unwrap();

    let orchestrator = Orchestrator::builder()
        .with_llm(Arc::new(planner))
        .with_tools(tools.clone())
        .with_shutdown(shutdown)
        .build()
        .await
        .unwrap();

    System {
        runtime,
        manager,
        tools,
        orchestrator,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_startup_registers_every_tool() {
    let sys = system(ScriptedPlanner::new(vec![]), "registry").await;

    let names: Vec<String> = sys.tools.list().await.unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(
        names,
        vec![
            "shell_exec",
            "file_read",
            "file_write",
            "file_list",
            "ssh_key_gen",
            "docker_start",
            "docker_stop",
            "docker_rebuild",
            "docker_status",
            "conversation",
            "autonomous_execution",
        ]
    );
    assert_eq!(sys.manager.status().await.unwrap().status, ContainerState::Running);
}

#[tokio::test]
async fn test_write_then_read_file_through_the_agent() {
    let planner = ScriptedPlanner::new(vec![
        serde_json::json!({ "tool": "file_write", "args": ["notes.txt", "hello", "world"] }),
        serde_json::json!({ "tool": "file_read", "args": ["notes.txt"] }),
        serde_json::json!({ "tool": "conversation", "args": ["Wrote and verified notes.txt"] }),
    ]);
    let sys = system(planner, "files").await;

    let outcome = sys
        .orchestrator
        .run("save a note", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.turns, 2);
    assert!(outcome.transcript.contains("Output: Successfully wrote to notes.txt\n"));
    assert!(outcome.transcript.contains("Output: hello world\n"));
    assert!(outcome
        .transcript
        .ends_with("Agent has completed the task: Wrote and verified notes.txt"));

    let files = sys.runtime.files();
    let files = files.lock().unwrap();
    assert_eq!(
        files.get("/home/developer/notes.txt").map(String::as_str),
        Some("hello world\n")
    );
}

#[tokio::test]
async fn test_autonomous_tool_via_registry() {
    let planner = ScriptedPlanner::new(vec![
        serde_json::json!({ "tool": "shell_exec", "args": ["pwd"] }),
        serde_json::json!({ "tool": "conversation", "args": ["done"] }),
    ]);
    let sys = system(planner, "autonomous").await;

    let output = sys
        .tools
        .execute("autonomous_execution", &["where am I".to_string()])
        .await
        .unwrap();

    assert!(output.contains("Step 1: Executed shell_exec with args: [\"pwd\"]\nOutput: /home/developer\n"));
    assert!(output.ends_with("Agent has completed the task: done"));
}

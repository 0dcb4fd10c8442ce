//! Orchestration against the sandbox tools, backed by the mock runtime.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use shellpilot_controller::{Orchestrator, Termination};
use shellpilot_core::config::SandboxSettings;
use shellpilot_core::mocks::MockLlm;
use shellpilot_core::traits::ToolRegistry;
use shellpilot_sandbox::{sandbox_tools, ContainerManager, MockRuntime, ShellChannel};
use shellpilot_skills::{ConversationTool, DefaultToolRegistry};

fn call(tool: &str, args: &[&str]) -> String {
    serde_json::json!({ "tool": tool, "args": args }).to_string()
}

async fn setup(llm: Arc<MockLlm>) -> (Arc<MockRuntime>, Arc<Orchestrator>) {
    let runtime = Arc::new(MockRuntime::new());
    let settings = SandboxSettings {
        host_dir: std::env::temp_dir()
            .join(format!("shellpilot-orch-{}", std::process::id()))
            .display()
            .to_string(),
        ..Default::default()
    };
    let manager = Arc::new(ContainerManager::new(
        runtime.clone(),
        settings,
        CancellationToken::new(),
    ));
    let channel = Arc::new(ShellChannel::new(manager));

    let registry = DefaultToolRegistry::with_tools(sandbox_tools(channel))
        .await
        .unwrap();
    registry.register(Arc::new(ConversationTool)).await.unwrap();

    let orch = Orchestrator::builder()
        .with_llm(llm)
        .with_tools(Arc::new(registry))
        .build()
        .await
        .unwrap();
    (runtime, orch)
}

#[tokio::test]
async fn test_shell_state_persists_across_turns() {
    let llm = Arc::new(MockLlm::new(vec![
        call("shell_exec", &["cd", "/tmp"]),
        call("shell_exec", &["pwd"]),
        call("conversation", &["in /tmp"]),
    ]));
    let (runtime, orch) = setup(llm).await;

    let outcome = orch.run("go to /tmp", &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.turns, 2);
    assert!(outcome
        .transcript
        .contains("Step 2: Executed shell_exec with args: [\"pwd\"]\nOutput: /tmp\n"));

    // One persistent shell served both turns.
    let attaches = runtime
        .calls()
        .iter()
        .filter(|c| c.starts_with("attach:"))
        .count();
    assert_eq!(attaches, 1);
}

#[tokio::test]
async fn test_failed_command_lets_planner_recover() {
    let llm = Arc::new(MockLlm::new(vec![
        call("shell_exec", &["frobnicate"]),
        call("shell_exec", &["echo", "recovered"]),
        call("conversation", &["done"]),
    ]));
    let (_runtime, orch) = setup(llm.clone()).await;

    let outcome = orch.run("try something", &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.termination, Termination::Completed);
    assert!(outcome.transcript.contains(
        "Output: command exited with non-zero status 127: sh: 1: frobnicate: not found"
    ));
    assert!(outcome.transcript.contains("Output: recovered\n"));
    assert!(llm.prompts()[1].contains("failed with error: command exited with non-zero status 127"));
}

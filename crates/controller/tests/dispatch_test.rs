//! Single-turn dispatch tests with a scripted planner.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use shellpilot_controller::{Dispatch, Orchestrator};
use shellpilot_core::mocks::{MockLlm, MockTool};
use shellpilot_core::traits::Tool;
use shellpilot_core::types::AgentDecision;
use shellpilot_core::Error;
use shellpilot_skills::builtin::ConversationTool;
use shellpilot_skills::registry::DefaultToolRegistry;

fn call(tool: &str, args: &[&str]) -> String {
    serde_json::json!({ "tool": tool, "args": args }).to_string()
}

async fn orchestrator(llm: Arc<MockLlm>, tools: Vec<Arc<dyn Tool>>) -> Arc<Orchestrator> {
    let registry = Arc::new(DefaultToolRegistry::with_tools(tools).await.unwrap());
    Orchestrator::builder()
        .with_llm(llm)
        .with_tools(registry)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_conversation_decision_is_a_reply() {
    let llm = Arc::new(MockLlm::constant(&call("conversation", &["Hello", "there!"])));
    let orch = orchestrator(llm, vec![Arc::new(ConversationTool)]).await;

    let dispatch = orch.decide("hi", &CancellationToken::new()).await.unwrap();
    assert_eq!(dispatch, Dispatch::Reply("Hello there!".into()));
}

#[tokio::test]
async fn test_tool_decision_sees_the_full_listing() {
    let list = MockTool::returning("file_list", "total 0\n");
    let stop = MockTool::echo("docker_stop");
    let llm = Arc::new(MockLlm::constant(&format!("```json\n{}\n```", call("file_list", &["."]))));
    let orch = orchestrator(llm.clone(), vec![list, stop]).await;

    let dispatch = orch
        .decide("list files in the current directory", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        dispatch,
        Dispatch::Call(AgentDecision::call("file_list", vec![".".into()]))
    );

    let prompt = &llm.prompts()[0];
    assert!(prompt.contains("- file_list: "));
    assert!(prompt.contains("- docker_stop: "));
    assert!(prompt.contains("- autonomous_execution: "));
    assert!(prompt.ends_with("User Task: list files in the current directory"));
}

#[tokio::test]
async fn test_malformed_output_is_a_reply() {
    let llm = Arc::new(MockLlm::constant("not json at all"));
    let orch = orchestrator(llm, vec![]).await;

    let dispatch = orch.decide("?", &CancellationToken::new()).await.unwrap();
    assert_eq!(dispatch, Dispatch::Reply("not json at all".into()));
}

#[tokio::test]
async fn test_planner_failure_is_returned() {
    let orch = orchestrator(Arc::new(MockLlm::failing()), vec![]).await;
    let err = orch.decide("hi", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::Planner(_)));
}

#[tokio::test]
async fn test_dispatch_returns_raw_tool_output() {
    let list = MockTool::returning("file_list", "total 0\n");
    let orch = orchestrator(Arc::new(MockLlm::constant("unused")), vec![list.clone()]).await;

    let output = orch
        .dispatch(
            &AgentDecision::call("file_list", vec![".".into()]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(output, "total 0\n");
    assert_eq!(list.calls(), vec![vec![".".to_string()]]);
}

#[tokio::test]
async fn test_dispatch_unknown_tool() {
    let orch = orchestrator(Arc::new(MockLlm::constant("unused")), vec![]).await;
    let err = orch
        .dispatch(&AgentDecision::call("nope", vec![]), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolNotFound(_)));
}

#[tokio::test]
async fn test_multi_step_work_goes_through_autonomous_execution() {
    let shell = MockTool::returning("shell_exec", "/home/developer");
    let llm = Arc::new(MockLlm::new(vec![
        call("autonomous_execution", &["find my home"]),
        call("shell_exec", &["pwd"]),
        call("conversation", &["found it"]),
    ]));
    let orch = orchestrator(llm.clone(), vec![shell]).await;
    let cancel = CancellationToken::new();

    let Dispatch::Call(decision) = orch.decide("find my home", &cancel).await.unwrap() else {
        panic!("expected a tool call");
    };
    let output = orch.dispatch(&decision, &cancel).await.unwrap();

    assert!(output.starts_with("Step 1: Executed shell_exec with args: [\"pwd\"]\nOutput: /home/developer\n"));
    assert!(output.ends_with("Agent has completed the task: found it"));
    assert!(llm.prompts()[1].contains("Original user request: \"find my home\""));
}

#[tokio::test]
async fn test_cancelled_decision() {
    let orch = orchestrator(Arc::new(MockLlm::constant("unused")), vec![]).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orch.decide("hi", &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
}

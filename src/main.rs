//! Shellpilot - an LLM-driven agent working inside a Docker sandbox.
//!
//! Wires configuration, telemetry, the sandbox container, tools, the planner
//! and the HTTP/WebSocket gateway together.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use shellpilot_controller::Orchestrator;
use shellpilot_core::config::AppConfig;
use shellpilot_core::traits::ToolRegistry;
use shellpilot_gateway::{AppState, GatewayServer};
use shellpilot_sandbox::{sandbox_tools, ContainerManager, DockerRuntime, ShellChannel};
use shellpilot_skills::{ConversationTool, DefaultToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    shellpilot_telemetry::configure_tracing(&config.telemetry)?;
    tracing::info!("Starting Shellpilot v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = shellpilot_telemetry::setup_metrics_recorder()?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown requested"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
            shutdown.cancel();
        });
    }

    // =========================================================================
    // Sandbox
    // =========================================================================
    let runtime = Arc::new(DockerRuntime::connect()?);
    let manager = Arc::new(ContainerManager::new(
        runtime,
        config.sandbox.clone(),
        shutdown.clone(),
    ));

    // Without a running sandbox there is nothing to serve.
    manager.check_runtime().await?;
    let container_id = manager.ensure_running().await?;
    tracing::info!(
        container = %config.sandbox.container_name,
        container_id = %container_id,
        "Sandbox container ready"
    );

    let channel = Arc::new(ShellChannel::new(manager.clone()));

    // =========================================================================
    // Tools
    // =========================================================================
    let tools = Arc::new(DefaultToolRegistry::with_tools(sandbox_tools(channel)).await?);
    tools.register(Arc::new(ConversationTool)).await?;

    // =========================================================================
    // Planner & orchestration
    // =========================================================================
    let planner = shellpilot_model_gateway::create_planner_client(&config.planner)?;
    let orchestrator = Orchestrator::builder()
        .with_config(config.orchestrator.clone())
        .with_llm(planner)
        .with_tools(tools.clone())
        .with_shutdown(shutdown.clone())
        .build()
        .await?;
    tracing::info!(tools = tools.len(), "Tool registry ready");

    // =========================================================================
    // Start the server
    // =========================================================================
    let server = GatewayServer::new(
        config.server.clone(),
        AppState {
            manager,
            tools,
            orchestrator,
            shutdown,
        },
    )
    .with_metrics(metrics_handle);

    server.run().await?;

    Ok(())
}

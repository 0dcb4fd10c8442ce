//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shellpilot_core::{Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Helper to track HTTP request metrics (latency, count).
pub fn track_request(method: &str, path: &str, status: u16, latency_sec: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(latency_sec);
}

/// Track one tool execution.
pub fn track_tool(tool: &str, outcome: &'static str, latency_sec: f64) {
    metrics::counter!("tool_executions_total", "tool" => tool.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("tool_execution_duration_seconds", "tool" => tool.to_string())
        .record(latency_sec);
}

/// Track one shell channel transaction (`ok`, `failed`, `desync`).
pub fn track_shell_transaction(outcome: &'static str, stdout_bytes: usize) {
    metrics::counter!("shell_transactions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("shell_transaction_stdout_bytes").record(stdout_bytes as f64);
}

/// Track a container lifecycle operation.
pub fn track_lifecycle(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "container_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to track planner calls and token usage.
pub fn track_planner_call(model: &str, prompt: u64, completion: u64, latency_sec: f64) {
    metrics::counter!("planner_calls_total", "model" => model.to_string()).increment(1);
    metrics::histogram!("planner_call_duration_seconds", "model" => model.to_string())
        .record(latency_sec);
    metrics::counter!("llm_token_usage_total", "model" => model.to_string(), "type" => "prompt")
        .increment(prompt);
    metrics::counter!("llm_token_usage_total", "model" => model.to_string(), "type" => "completion")
        .increment(completion);
}

/// Track one orchestration turn.
pub fn track_turn() {
    metrics::counter!("orchestration_turns_total").increment(1);
}

/// Track how an orchestration ended (`completed`, `exhausted`, `failed`).
pub fn track_orchestration(termination: &'static str, turns: usize) {
    metrics::counter!("orchestrations_total", "termination" => termination).increment(1);
    metrics::histogram!("orchestration_turns").record(turns as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: recording is a no-op and must not panic.
        track_tool("shell_exec", "ok", 0.01);
        track_shell_transaction("desync", 0);
        track_lifecycle("ensure_running", "ok");
        track_orchestration("exhausted", 15);
    }
}

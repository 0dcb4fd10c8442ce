//! The agent WebSocket.
//!
//! Each text frame is one request: a `tool_exec` envelope is dispatched
//! straight to the registry. Anything else is a free-form task: the planner
//! answers it directly or picks one tool call, which runs and returns its
//! output.
//!
//! Requests on one connection are served in order. Closing the socket
//! cancels whatever is in flight.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use shellpilot_controller::Dispatch;
use shellpilot_core::types::{ClientEnvelope, ServerMessage, ToolExecRequest};
use shellpilot_core::Error;

use crate::server::AppState;

/// Text that asks for the full tool listing.
pub const TOOLS_COMMAND: &str = "/tools";
pub const THINKING_STATUS: &str = "Agent is thinking...";

pub(crate) async fn agent_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();

    let outgoing = Box::pin(sender.with(|msg: ServerMessage| async move {
        let text = serde_json::to_string(&msg).map_err(axum::Error::new)?;
        Ok::<_, axum::Error>(Message::Text(text))
    }));
    let incoming = Box::pin(
        receiver
            .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(text),
                    Ok(Message::Binary(bytes)) => String::from_utf8(bytes).ok(),
                    _ => None,
                })
            }),
    );

    agent_session(state, outgoing, incoming).await;
}

/// Serve one agent connection until the peer's stream ends.
pub async fn agent_session<Tx, Rx>(state: Arc<AppState>, tx: Tx, mut rx: Rx)
where
    Tx: Sink<ServerMessage> + Unpin + Send + 'static,
    Rx: Stream<Item = String> + Unpin,
{
    let session_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("agent_session", session_id = %session_id);
    let cancel = state.shutdown.child_token();
    let (request_tx, request_rx) = mpsc::channel::<String>(16);

    tracing::info!(session_id = %session_id, "Agent session opened");
    let worker = tokio::spawn(
        serve_requests(state, tx, request_rx, cancel.clone()).instrument(span),
    );

    while let Some(text) = rx.next().await {
        if request_tx.send(text).await.is_err() {
            break;
        }
    }

    // Peer is gone: abandon queued work and stop what is running.
    drop(request_tx);
    cancel.cancel();
    if let Err(e) = worker.await {
        tracing::warn!(session_id = %session_id, error = %e, "Agent session worker panicked");
    }
    tracing::info!(session_id = %session_id, "Agent session closed");
}

async fn serve_requests<Tx>(
    state: Arc<AppState>,
    mut tx: Tx,
    mut requests: mpsc::Receiver<String>,
    cancel: CancellationToken,
) where
    Tx: Sink<ServerMessage> + Unpin,
{
    while let Some(text) = requests.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        if respond(&state, &text, &mut tx, &cancel).await.is_err() {
            tracing::debug!("Agent socket write failed");
            break;
        }
    }
}

/// Handle one request. Errs only when the peer can no longer be written to.
async fn respond<Tx>(
    state: &AppState,
    text: &str,
    tx: &mut Tx,
    cancel: &CancellationToken,
) -> Result<(), Tx::Error>
where
    Tx: Sink<ServerMessage> + Unpin,
{
    if text.trim() == TOOLS_COMMAND {
        let reply = match state.tools.describe().await {
            Ok(listing) => ServerMessage::output(format!("Available Tools:\n{}", listing)),
            Err(e) => ServerMessage::error(format!("Failed to list tools: {}", e)),
        };
        return tx.send(reply).await;
    }

    match ClientEnvelope::from_text(text) {
        ClientEnvelope::ToolExec(ToolExecRequest { tool, args }) => {
            tx.send(ServerMessage::status(format!(
                "Executing tool '{}' with args: {:?}",
                tool, args
            )))
            .await?;

            let result = tokio::select! {
                res = state.tools.execute(&tool, &args) => res,
                _ = cancel.cancelled() => return Ok(()),
            };
            let reply = match result {
                Ok(output) => ServerMessage::output(output),
                Err(e) => {
                    tracing::warn!(tool = %tool, error = %e, "Direct tool call failed");
                    ServerMessage::error(format!("Failed to execute tool '{}': {}", tool, e))
                }
            };
            tx.send(reply).await
        }
        ClientEnvelope::Conversation(task) => {
            tx.send(ServerMessage::status(THINKING_STATUS)).await?;

            let call = match state.orchestrator.decide(&task, cancel).await {
                Ok(Dispatch::Reply(message)) => return tx.send(ServerMessage::output(message)).await,
                Ok(Dispatch::Call(call)) => call,
                Err(Error::Cancelled(_)) => return Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "Planning failed");
                    return tx.send(ServerMessage::error(failure_message(&e))).await;
                }
            };

            tx.send(ServerMessage::status(format!(
                "Executing tool '{}' with args: {:?}",
                call.tool, call.args
            )))
            .await?;

            let reply = match state.orchestrator.dispatch(&call, cancel).await {
                Ok(output) => ServerMessage::output(output),
                Err(Error::Cancelled(_)) => return Ok(()),
                Err(Error::ToolNotFound(_)) => ServerMessage::error(format!(
                    "Error: AI requested an unknown tool: '{}'",
                    call.tool
                )),
                Err(e) => {
                    tracing::warn!(tool = %call.tool, error = %e, "Dispatched tool failed");
                    ServerMessage::error(format!("Failed to execute tool '{}': {}", call.tool, e))
                }
            };
            tx.send(reply).await
        }
    }
}

/// Client-facing text for a request that failed before any tool ran.
fn failure_message(e: &Error) -> String {
    match e {
        Error::Planner(_) => format!("Failed to get response from LLM: {}", e),
        _ => format!("Failed to process request: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_names_the_planner_only_for_planner_errors() {
        let planner = failure_message(&Error::planner("quota exceeded"));
        assert!(planner.starts_with("Failed to get response from LLM: "));
        assert!(planner.contains("quota exceeded"));

        let other = failure_message(&Error::internal("registry unavailable"));
        assert!(other.starts_with("Failed to process request: "));
        assert!(other.contains("registry unavailable"));
    }
}

//! Interactive terminal WebSocket.

use axum::extract::{
    ws::{Message, WebSocket, WebSocketUpgrade},
    State,
};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use shellpilot_sandbox::{bridge, PeerFrame, TerminalSession};

use crate::server::AppState;

pub(crate) async fn terminal_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();
    let (mut sender, receiver) = socket.split();

    let session = match TerminalSession::open(&state.manager).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Failed to open terminal");
            let _ = sender
                .send(Message::Text(format!("\r\nFailed to start terminal: {}\r\n", e)))
                .await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::info!(
        session_id = %session_id,
        exec_id = %session.exec_id(),
        shell = %session.shell(),
        "Terminal opened"
    );

    let peer_tx = Box::pin(sender.with(|frame: PeerFrame| {
        future::ready(Ok::<_, axum::Error>(match frame {
            PeerFrame::Text(text) => Message::Text(text),
            PeerFrame::Binary(bytes) => Message::Binary(bytes.to_vec()),
        }))
    }));
    let peer_rx = Box::pin(
        receiver
            .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(PeerFrame::Text(text)),
                    Ok(Message::Binary(bytes)) => Some(PeerFrame::Binary(Bytes::from(bytes))),
                    _ => None,
                })
            }),
    );

    bridge(session, peer_tx, peer_rx, state.shutdown.child_token()).await;
    tracing::info!(session_id = %session_id, "Terminal closed");
}

//! HTTP control surface for the sandbox container.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use shellpilot_sandbox::ContainerStatus;

use crate::server::{error_response, AppState};

/// Result of a control action.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContainerStatus>,
}

pub(crate) async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Container status failed");
            error_response(&e)
        }
    }
}

pub(crate) async fn start_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.ensure_running().await {
        Ok(id) => control_ok(&state, format!("Container running ({})", short_id(&id))).await,
        Err(e) => {
            tracing::error!(error = %e, "Container start failed");
            error_response(&e)
        }
    }
}

pub(crate) async fn stop_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.stop().await {
        Ok(()) => control_ok(&state, "Container stopped".to_string()).await,
        Err(e) => {
            tracing::error!(error = %e, "Container stop failed");
            error_response(&e)
        }
    }
}

pub(crate) async fn rebuild_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.rebuild().await {
        Ok(id) => control_ok(&state, format!("Container rebuilt ({})", short_id(&id))).await,
        Err(e) => {
            tracing::error!(error = %e, "Container rebuild failed");
            error_response(&e)
        }
    }
}

async fn control_ok(state: &AppState, message: String) -> Response {
    // The action already succeeded; a failing status probe only drops the detail.
    let status = state.manager.status().await.ok();
    Json(ControlResponse {
        ok: true,
        message,
        status,
    })
    .into_response()
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

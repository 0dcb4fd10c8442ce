//! Interactive terminal sessions.
//!
//! A terminal is a second, TTY-backed shell in the sandbox, independent of the
//! persistent shell channel. `bridge` connects one to a remote peer: terminal
//! output goes out as binary frames, peer frames are written to the terminal,
//! and a `{"type":"resize","rows":R,"cols":C}` text frame resizes it instead.
//!
//! Closing the attach connection does not end a TTY exec, so the shell is
//! started through a wrapper that records its pid and is killed on teardown.

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shellpilot_core::{Error, Result};

use crate::engine::{ContainerRuntime, ExecSpec};
use crate::frame::{ExecInput, FrameStream};
use crate::lifecycle::ContainerManager;

/// Sent to the peer once the terminal output ends.
pub const CLOSED_NOTICE: &str = "\n[pty closed]\n";

/// Terminal resize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSignal {
    pub rows: u16,
    pub cols: u16,
}

#[derive(Deserialize)]
struct ControlMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    rows: i64,
    #[serde(default)]
    cols: i64,
}

impl ResizeSignal {
    /// Parse a resize control message. Anything else, including a resize with
    /// non-positive dimensions, is not a control message.
    pub fn parse(text: &str) -> Option<Self> {
        if !text.starts_with('{') {
            return None;
        }
        let msg: ControlMessage = serde_json::from_str(text).ok()?;
        if msg.kind != "resize" || msg.rows <= 0 || msg.cols <= 0 {
            return None;
        }
        Some(Self {
            rows: u16::try_from(msg.rows).ok()?,
            cols: u16::try_from(msg.cols).ok()?,
        })
    }
}

/// A frame exchanged with the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Text(String),
    Binary(Bytes),
}

// =============================================================================
// Terminal Session
// =============================================================================

/// A TTY exec inside the sandbox container.
pub struct TerminalSession {
    exec_id: String,
    container_id: String,
    shell: String,
    pid_file: String,
    runtime: Arc<dyn ContainerRuntime>,
    output: FrameStream,
    input: ExecInput,
}

impl TerminalSession {
    /// Start a terminal, trying each configured shell in order.
    pub async fn open(manager: &ContainerManager) -> Result<Self> {
        let container_id = manager.ensure_running().await?;
        let settings = manager.settings();
        let runtime = manager.runtime().clone();

        let shell = pick_shell(runtime.as_ref(), &container_id, &settings.terminal_shells).await?;
        let pid_file = format!("/tmp/.shellpilot-pty-{}", Uuid::new_v4().simple());
        let stream = runtime
            .attach_tty(
                &container_id,
                &ExecSpec {
                    cmd: vec![
                        "/bin/sh".into(),
                        "-c".into(),
                        format!("echo $$ > {}; exec {}", pid_file, shell),
                    ],
                    user: settings.user.clone(),
                    workdir: settings.workdir.clone(),
                },
            )
            .await?;

        tracing::info!(container = %container_id, exec_id = %stream.exec_id, shell = %shell, "Terminal opened");
        Ok(Self {
            exec_id: stream.exec_id,
            container_id,
            shell,
            pid_file,
            runtime,
            output: stream.output,
            input: stream.input,
        })
    }

    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

/// Hang up the terminal's shell and remove its pid file.
async fn kill_shell(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    exec_id: &str,
    pid_file: &str,
) {
    let command = format!(
        "kill -HUP $(cat {0} 2>/dev/null) 2>/dev/null; rm -f {0}",
        pid_file
    );
    match runtime.exec(container_id, &command, None).await {
        Ok(_) => tracing::debug!(exec_id = %exec_id, "Terminal shell killed"),
        Err(e) => tracing::warn!(exec_id = %exec_id, error = %e, "Failed to kill terminal shell"),
    }
}

async fn pick_shell(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    candidates: &[String],
) -> Result<String> {
    for shell in candidates {
        match runtime.exec(container_id, &format!("test -x {}", shell), None).await {
            Ok(out) if out.success() => return Ok(shell.clone()),
            Ok(_) => tracing::debug!(shell = %shell, "Shell not available, trying next"),
            Err(e) => return Err(e),
        }
    }
    Err(Error::container(format!(
        "no usable shell among {}",
        candidates.join(", ")
    )))
}

/// Bridge a terminal to a peer until either side ends or `cancel` fires.
///
/// On return the terminal input is closed and the shell process is killed.
pub async fn bridge<Tx, Rx>(
    session: TerminalSession,
    mut peer_tx: Tx,
    mut peer_rx: Rx,
    cancel: CancellationToken,
) where
    Tx: Sink<PeerFrame> + Unpin,
    Rx: Stream<Item = PeerFrame> + Unpin,
{
    let TerminalSession {
        exec_id,
        container_id,
        pid_file,
        runtime,
        mut output,
        mut input,
        ..
    } = session;

    {
        let to_peer = async {
            while let Some(item) = output.next().await {
                match item {
                    Ok(frame) => {
                        if peer_tx.send(PeerFrame::Binary(frame.payload)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(exec_id = %exec_id, error = %e, "Terminal read failed");
                        break;
                    }
                }
            }
            let _ = peer_tx.send(PeerFrame::Text(CLOSED_NOTICE.to_string())).await;
        };

        let to_terminal = async {
            while let Some(frame) = peer_rx.next().await {
                let bytes = match frame {
                    PeerFrame::Text(text) => {
                        if let Some(signal) = ResizeSignal::parse(&text) {
                            if let Err(e) =
                                runtime.resize_tty(&exec_id, signal.rows, signal.cols).await
                            {
                                tracing::warn!(exec_id = %exec_id, error = %e, "Terminal resize failed");
                            }
                            continue;
                        }
                        Bytes::from(text)
                    }
                    PeerFrame::Binary(bytes) => bytes,
                };
                if input.write_all(&bytes).await.is_err() || input.flush().await.is_err() {
                    break;
                }
            }
        };

        tokio::select! {
            _ = to_peer => tracing::debug!(exec_id = %exec_id, "Terminal output ended"),
            _ = to_terminal => tracing::debug!(exec_id = %exec_id, "Peer input ended"),
            _ = cancel.cancelled() => tracing::debug!(exec_id = %exec_id, "Terminal bridge cancelled"),
        }
    }

    let _ = input.shutdown().await;
    drop(output);
    kill_shell(runtime.as_ref(), &container_id, &exec_id, &pid_file).await;
    tracing::info!(exec_id = %exec_id, "Terminal closed");
}

//! Persistent shell channel.
//!
//! One long-lived shell runs inside the container with stdin attached.
//! Each command is written as
//!
//! ```text
//! { <command>
//! }; echo -n '<marker>' $? >&2
//! ```
//!
//! and output frames are read until the marker followed by an exit code shows
//! up on stderr. Stdout is returned verbatim; stderr before the marker is the
//! error detail of a failed command. The shell is never restarted between
//! commands, so `cd` and exported variables persist.

use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use shellpilot_core::{Error, Result};

use crate::engine::ExecSpec;
use crate::frame::{AttachedStream, StreamKind};
use crate::lifecycle::ContainerManager;

/// Sentinel written to stderr after every command.
pub const COMPLETION_MARKER: &str = "END_OF_COMMAND_MARKER_e5d5a7b8-b2e0-4c0f-83b3-2f1b6d7a3b7d";

const TRUNCATION_NOTE: &str = "\n... [output truncated]";

/// Build the line written to the shell for `command`.
///
/// The command always sits alone in a `{ ...\n}` group so a trailing comment,
/// a trailing `&` or a here-document terminator cannot swallow the marker echo.
pub fn frame_command(command: &str) -> String {
    let command = command.trim_end_matches('\n');
    format!("{{ {}\n}}; echo -n '{}' $? >&2\n", command, COMPLETION_MARKER)
}

// =============================================================================
// Buffers
// =============================================================================

/// Stdout accumulator capped at `limit` bytes.
struct BoundedBuffer {
    data: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl BoundedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        if bytes.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn into_string(self) -> String {
        let mut out = String::from_utf8_lossy(&self.data).into_owned();
        if self.truncated {
            out.push_str(TRUNCATION_NOTE);
        }
        out
    }
}

/// Incremental marker search over stderr.
///
/// Only the bytes that could still contain the start of the marker are kept in
/// `window`; everything older has been ruled out and moves to `detail`.
struct MarkerScanner {
    marker: &'static [u8],
    window: Vec<u8>,
    detail: BoundedBuffer,
    marker_at: Option<usize>,
}

impl MarkerScanner {
    fn new(marker: &'static str, limit: usize) -> Self {
        Self {
            marker: marker.as_bytes(),
            window: Vec::new(),
            detail: BoundedBuffer::new(limit),
            marker_at: None,
        }
    }

    /// Feed stderr bytes. Returns the exit code token once it is complete.
    fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.window.extend_from_slice(bytes);

        if self.marker_at.is_none() {
            self.marker_at = find(&self.window, self.marker);
            if self.marker_at.is_none() {
                let keep = self.marker.len().saturating_sub(1);
                if self.window.len() > keep {
                    let cut = self.window.len() - keep;
                    self.detail.push(&self.window[..cut]);
                    self.window.drain(..cut);
                }
                return None;
            }
        }

        let start = self.marker_at? + self.marker.len();
        let token: String = String::from_utf8_lossy(&self.window[start..])
            .split_whitespace()
            .next()?
            .to_string();
        Some(token)
    }

    /// Stderr written before the marker.
    fn into_detail(mut self) -> String {
        let end = self.marker_at.unwrap_or(self.window.len());
        self.detail.push(&self.window[..end]);
        self.detail.into_string().trim().to_string()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

// =============================================================================
// Shell Session
// =============================================================================

/// One attached shell process. Not shareable: one transaction at a time.
pub struct ShellSession {
    stream: AttachedStream,
    generation: u64,
    max_output_bytes: usize,
    /// Set while a transaction is in flight. Still set on the next call means
    /// the previous caller was cancelled mid-read and the stream is out of sync.
    in_flight: bool,
}

impl ShellSession {
    pub fn new(stream: AttachedStream, generation: u64, max_output_bytes: usize) -> Self {
        Self {
            stream,
            generation,
            max_output_bytes,
            in_flight: false,
        }
    }

    pub fn exec_id(&self) -> &str {
        &self.stream.exec_id
    }

    /// Run one command and wait for its completion marker.
    pub async fn transact(&mut self, command: &str) -> Result<String> {
        self.in_flight = true;

        let line = frame_command(command);
        self.stream
            .input
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::protocol_desync(format!("shell input closed: {}", e)))?;
        self.stream
            .input
            .flush()
            .await
            .map_err(|e| Error::protocol_desync(format!("shell input closed: {}", e)))?;

        let mut stdout = BoundedBuffer::new(self.max_output_bytes);
        let mut scanner = MarkerScanner::new(COMPLETION_MARKER, self.max_output_bytes);

        let exit_code = loop {
            let frame = match self.stream.output.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(Error::ProtocolDesync(msg))) => return Err(Error::ProtocolDesync(msg)),
                Some(Err(e)) => return Err(Error::protocol_desync(e.to_string())),
                None => {
                    return Err(Error::protocol_desync(
                        "shell stream closed before completion marker",
                    ))
                }
            };
            match frame.kind {
                StreamKind::Stdout | StreamKind::Console => stdout.push(&frame.payload),
                StreamKind::Stderr => {
                    if let Some(code) = scanner.push(&frame.payload) {
                        break code;
                    }
                }
                StreamKind::Stdin => {}
            }
        };

        self.in_flight = false;

        if exit_code == "0" {
            Ok(stdout.into_string())
        } else {
            Err(Error::command_failed(exit_code, scanner.into_detail()))
        }
    }
}

// =============================================================================
// Shell Channel
// =============================================================================

/// Serialized access to the container's persistent shell.
///
/// The session is attached lazily on first use and discarded after a protocol
/// desync, an interrupted transaction, or a container stop/rebuild.
pub struct ShellChannel {
    manager: Arc<ContainerManager>,
    session: tokio::sync::Mutex<Option<ShellSession>>,
}

impl ShellChannel {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        Self {
            manager,
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn manager(&self) -> &Arc<ContainerManager> {
        &self.manager
    }

    /// Run `command` in the persistent shell and return its stdout.
    ///
    /// A non-zero exit status is reported as `Error::CommandFailed`.
    pub async fn run(&self, command: &str) -> Result<String> {
        let mut slot = self.session.lock().await;
        let generation = self.manager.generation();

        let stale = match slot.as_ref() {
            Some(s) if s.generation != generation => Some("container was stopped or rebuilt"),
            Some(s) if s.in_flight => Some("previous transaction was interrupted"),
            _ => None,
        };
        if let Some(reason) = stale {
            tracing::warn!(reason, "Discarding shell session");
            *slot = None;
        }

        if slot.is_none() {
            *slot = Some(self.attach(generation).await?);
        }
        let session = slot
            .as_mut()
            .ok_or_else(|| Error::internal("shell session missing after attach"))?;

        tracing::debug!(exec_id = %session.exec_id(), command = %command, "Shell transaction");
        let result = session.transact(command).await;

        match &result {
            Ok(out) => shellpilot_telemetry::track_shell_transaction("ok", out.len()),
            Err(Error::CommandFailed { exit_code, .. }) => {
                tracing::debug!(exit_code = %exit_code, "Command exited non-zero");
                shellpilot_telemetry::track_shell_transaction("failed", 0);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Shell session lost; will re-attach on next command");
                shellpilot_telemetry::track_shell_transaction("desync", 0);
                *slot = None;
            }
        }
        result
    }

    async fn attach(&self, generation: u64) -> Result<ShellSession> {
        let container_id = self.manager.ensure_running().await?;
        let settings = self.manager.settings();
        let stream = self
            .manager
            .runtime()
            .attach(
                &container_id,
                &ExecSpec {
                    cmd: vec![settings.shell.clone()],
                    user: settings.user.clone(),
                    workdir: settings.workdir.clone(),
                },
            )
            .await?;
        tracing::info!(container = %container_id, exec_id = %stream.exec_id, "Persistent shell attached");
        Ok(ShellSession::new(stream, generation, settings.max_output_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameCodec};
    use futures::SinkExt;
    use tokio::io::AsyncReadExt;
    use tokio_util::codec::FramedWrite;

    fn marker_line(code: &str) -> String {
        format!("{} {}", COMPLETION_MARKER, code)
    }

    /// Session over in-memory pipes; returns the remote frame writer and the
    /// reader of whatever the session writes to stdin.
    fn session(
        limit: usize,
    ) -> (
        ShellSession,
        FramedWrite<tokio::io::DuplexStream, FrameCodec>,
        tokio::io::DuplexStream,
    ) {
        let (out_remote, out_local) = tokio::io::duplex(1 << 16);
        let (in_local, in_remote) = tokio::io::duplex(1 << 16);
        let stream = AttachedStream::from_multiplexed("exec-test", out_local, in_local);
        (
            ShellSession::new(stream, 0, limit),
            FramedWrite::new(out_remote, FrameCodec),
            in_remote,
        )
    }

    #[test]
    fn test_frame_single_line() {
        assert_eq!(
            frame_command("ls -la ."),
            format!("{{ ls -la .\n}}; echo -n '{}' $? >&2\n", COMPLETION_MARKER)
        );
    }

    #[test]
    fn test_frame_keeps_comment_and_background_inside_group() {
        assert!(frame_command("echo hi # note").starts_with("{ echo hi # note\n}; echo -n '"));
        assert!(frame_command("sleep 5 &").starts_with("{ sleep 5 &\n}; echo -n '"));
    }

    #[test]
    fn test_frame_heredoc_grouped() {
        let framed = frame_command("tee a.txt <<'EOF'\nhi\nEOF");
        assert!(framed.starts_with("{ tee a.txt <<'EOF'\nhi\nEOF\n}; echo -n '"));
    }

    #[test]
    fn test_scanner_marker_split_across_chunks() {
        let mut scanner = MarkerScanner::new(COMPLETION_MARKER, 1024);
        let line = format!("warning: x\n{}", marker_line("2"));
        let (a, b) = line.as_bytes().split_at(20);
        assert!(scanner.push(a).is_none());
        assert_eq!(scanner.push(b).as_deref(), Some("2"));
        assert_eq!(scanner.into_detail(), "warning: x");
    }

    #[test]
    fn test_scanner_waits_for_exit_code() {
        let mut scanner = MarkerScanner::new(COMPLETION_MARKER, 1024);
        assert!(scanner.push(COMPLETION_MARKER.as_bytes()).is_none());
        assert!(scanner.push(b" ").is_none());
        assert_eq!(scanner.push(b"127").as_deref(), Some("127"));
    }

    #[test]
    fn test_scanner_keeps_window_small() {
        let mut scanner = MarkerScanner::new(COMPLETION_MARKER, 1 << 20);
        for _ in 0..100 {
            scanner.push(&[b'e'; 1000]);
        }
        assert!(scanner.window.len() < COMPLETION_MARKER.len());
    }

    #[test]
    fn test_bounded_buffer_truncates() {
        let mut buf = BoundedBuffer::new(4);
        buf.push(b"abcdef");
        assert_eq!(buf.into_string(), format!("abcd{}", TRUNCATION_NOTE));
    }

    #[tokio::test]
    async fn test_transact_success() {
        let (mut session, mut remote, mut stdin) = session(1024);
        let task = tokio::spawn(async move { session.transact("echo hello").await });

        let mut buf = vec![0u8; 256];
        let n = stdin.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("{ echo hello\n}; echo -n '"));

        remote.send(Frame::stdout(&b"hello\n"[..])).await.unwrap();
        remote.send(Frame::stderr(marker_line("0"))).await.unwrap();

        assert_eq!(task.await.unwrap().unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_transact_nonzero_exit() {
        let (mut session, mut remote, _stdin) = session(1024);
        let task = tokio::spawn(async move { session.transact("ls nope").await });

        remote
            .send(Frame::stderr(&b"ls: cannot access 'nope'\n"[..]))
            .await
            .unwrap();
        remote.send(Frame::stderr(marker_line("2"))).await.unwrap();

        match task.await.unwrap() {
            Err(Error::CommandFailed { exit_code, stderr }) => {
                assert_eq!(exit_code, "2");
                assert_eq!(stderr, "ls: cannot access 'nope'");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_marker_on_stdout_does_not_complete() {
        let (mut session, mut remote, _stdin) = session(1024);
        let task = tokio::spawn(async move { session.transact("cat marker.txt").await });

        let fake = format!("{} 0\n", COMPLETION_MARKER);
        remote.send(Frame::stdout(fake.clone())).await.unwrap();
        tokio::task::yield_now().await;
        remote.send(Frame::stderr(marker_line("0"))).await.unwrap();

        assert_eq!(task.await.unwrap().unwrap(), fake);
    }

    #[tokio::test]
    async fn test_stream_closed_is_desync() {
        let (mut session, remote, _stdin) = session(1024);
        drop(remote);
        let err = session.transact("sleep 1").await.unwrap_err();
        assert!(matches!(err, Error::ProtocolDesync(_)));
        assert!(session.in_flight);
    }
}

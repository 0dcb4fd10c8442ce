//! In-memory container runtime for tests.
//!
//! `MockRuntime` keeps container state in memory and answers `attach` with a
//! tiny scripted shell that speaks the real multiplexed frame format over
//! `tokio::io::duplex` pipes, so the shell channel and tools run end to end
//! without a Docker daemon.

use async_trait::async_trait;
use futures::SinkExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::FramedWrite;

use shellpilot_core::{Error, Result};

use crate::engine::{
    ContainerInfo, ContainerRuntime, ContainerSpec, ExecOutput, ExecSpec, ImageBuildSpec,
};
use crate::frame::{AttachedStream, Frame, FrameCodec};
use crate::shell::COMPLETION_MARKER;

/// Shared in-memory filesystem of the fake container.
pub type MockFiles = Arc<Mutex<BTreeMap<String, String>>>;

#[derive(Default)]
struct MockState {
    container: Option<MockContainer>,
    builds: usize,
    calls: Vec<String>,
    resizes: Vec<(String, u16, u16)>,
    exec_seq: u64,
}

struct MockContainer {
    id: String,
    running: bool,
}

/// Scripted `ContainerRuntime`.
pub struct MockRuntime {
    state: Mutex<MockState>,
    files: MockFiles,
    tty_input: Arc<Mutex<Vec<u8>>>,
    shells: Vec<String>,
    build_error: Option<String>,
    build_delay: Option<Duration>,
    exec_exit_code: i64,
    reachable: bool,
    home: String,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// No container, image builds succeed.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            files: Arc::new(Mutex::new(BTreeMap::new())),
            tty_input: Arc::new(Mutex::new(Vec::new())),
            shells: vec!["/bin/bash".into(), "/bin/sh".into()],
            build_error: None,
            build_delay: None,
            exec_exit_code: 0,
            reachable: true,
            home: "/home/developer".into(),
        }
    }

    /// Existing container, running or stopped.
    pub fn with_container(running: bool) -> Self {
        let runtime = Self::new();
        if let Ok(mut state) = runtime.state.lock() {
            state.container = Some(MockContainer {
                id: "mock-container".into(),
                running,
            });
        }
        runtime
    }

    /// Make image builds fail.
    pub fn with_build_error(mut self, message: &str) -> Self {
        self.build_error = Some(message.to_string());
        self
    }

    /// Make image builds slow.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    /// Shells that exist in the fake container image.
    pub fn with_shells(mut self, shells: &[&str]) -> Self {
        self.shells = shells.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Exit code for one-shot execs other than shell probes.
    pub fn with_exec_exit_code(mut self, code: i64) -> Self {
        self.exec_exit_code = code;
        self
    }

    /// Make `ping` fail, as if the daemon were down.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Runtime calls made so far, e.g. `build`, `create`, `start`, `attach:/bin/bash`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn builds(&self) -> usize {
        self.state.lock().map(|s| s.builds).unwrap_or_default()
    }

    pub fn resizes(&self) -> Vec<(String, u16, u16)> {
        self.state.lock().map(|s| s.resizes.clone()).unwrap_or_default()
    }

    /// Bytes written into TTY sessions.
    pub fn tty_input(&self) -> Vec<u8> {
        self.tty_input.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn files(&self) -> MockFiles {
        self.files.clone()
    }

    /// Stop the container behind the manager's back.
    pub fn kill_container(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(c) = state.container.as_mut() {
                c.running = false;
            }
        }
    }

    fn record(&self, call: impl Into<String>) -> Result<()> {
        let mut state = self.lock()?;
        state.calls.push(call.into());
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| Error::internal("mock runtime lock poisoned"))
    }

    fn require_running(&self, id: &str) -> Result<u64> {
        let mut state = self.lock()?;
        match &state.container {
            Some(c) if c.id == id && c.running => {
                state.exec_seq += 1;
                Ok(state.exec_seq)
            }
            _ => Err(Error::container(format!("container {} is not running", id))),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn find_container(&self, _name: &str) -> Result<Option<ContainerInfo>> {
        let state = self.lock()?;
        Ok(state.container.as_ref().map(|c| ContainerInfo {
            id: c.id.clone(),
            status: if c.running {
                "Up 2 seconds".into()
            } else {
                "Exited (0) 1 second ago".into()
            },
        }))
    }

    async fn build_image(&self, spec: &ImageBuildSpec) -> Result<()> {
        self.record("build")?;
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.build_error {
            return Err(Error::image_build(format!("docker build failed for {}: {}", spec.tag, msg)));
        }
        self.lock()?.builds += 1;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record(format!(
            "create:{}:{}",
            spec.host_dir.display(),
            spec.mount_target
        ))?;
        let mut state = self.lock()?;
        if state.container.is_some() {
            return Err(Error::container(format!("name {} already in use", spec.name)));
        }
        let id = format!("mock-{}", state.builds);
        state.container = Some(MockContainer {
            id: id.clone(),
            running: false,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record("start")?;
        let mut state = self.lock()?;
        match state.container.as_mut() {
            Some(c) if c.id == id => {
                c.running = true;
                Ok(())
            }
            _ => Err(Error::container(format!("no such container: {}", id))),
        }
    }

    async fn stop_container(&self, _id: &str) -> Result<()> {
        self.record("stop")?;
        if let Some(c) = self.lock()?.container.as_mut() {
            c.running = false;
        }
        Ok(())
    }

    async fn remove_container(&self, _id: &str) -> Result<()> {
        self.record("remove")?;
        self.lock()?.container = None;
        Ok(())
    }

    async fn exec(&self, id: &str, command: &str, _user: Option<&str>) -> Result<ExecOutput> {
        self.require_running(id)?;
        self.record(format!("exec:{}", command))?;
        if let Some(shell) = command.strip_prefix("test -x ") {
            let exists = self.shells.iter().any(|s| s == shell.trim());
            return Ok(ExecOutput {
                exit_code: if exists { 0 } else { 1 },
                ..Default::default()
            });
        }
        Ok(ExecOutput {
            exit_code: self.exec_exit_code,
            stdout: String::new(),
            stderr: if self.exec_exit_code == 0 {
                String::new()
            } else {
                "init failed".into()
            },
        })
    }

    async fn attach(&self, id: &str, spec: &ExecSpec) -> Result<AttachedStream> {
        let seq = self.require_running(id)?;
        self.record(format!("attach:{}", spec.cmd.join(" ")))?;

        let (out_remote, out_local) = tokio::io::duplex(1 << 16);
        let (in_local, in_remote) = tokio::io::duplex(1 << 16);
        let shell = FakeShell {
            cwd: spec.workdir.clone(),
            home: self.home.clone(),
            files: self.files.clone(),
        };
        tokio::spawn(shell.run(in_remote, FramedWrite::new(out_remote, FrameCodec)));

        Ok(AttachedStream::from_multiplexed(
            format!("exec-{}", seq),
            out_local,
            in_local,
        ))
    }

    async fn attach_tty(&self, id: &str, spec: &ExecSpec) -> Result<AttachedStream> {
        let seq = self.require_running(id)?;
        self.record(format!("tty:{}", spec.cmd.join(" ")))?;

        let (mut out_remote, out_local) = tokio::io::duplex(1 << 16);
        let (in_local, mut in_remote) = tokio::io::duplex(1 << 16);
        let captured = self.tty_input.clone();

        // Echo terminal: input is written back, `exit` closes the terminal.
        tokio::spawn(async move {
            if out_remote.write_all(b"$ ").await.is_err() {
                return;
            }
            let mut buf = [0u8; 1024];
            loop {
                let n = match in_remote.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if let Ok(mut c) = captured.lock() {
                    c.extend_from_slice(&buf[..n]);
                }
                if out_remote.write_all(&buf[..n]).await.is_err() || buf[..n].starts_with(b"exit") {
                    break;
                }
            }
        });

        Ok(AttachedStream::from_tty(format!("tty-{}", seq), out_local, in_local))
    }

    async fn resize_tty(&self, exec_id: &str, rows: u16, cols: u16) -> Result<()> {
        self.lock()?.resizes.push((exec_id.to_string(), rows, cols));
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.reachable
    }
}

// =============================================================================
// Fake Shell
// =============================================================================

/// Minimal shell understood by the mock: `cd`, `pwd`, `echo`, `true`,
/// `false`, `cat`, `ls -la`, `tee` with a here-document, `chown`, `sleep`,
/// `ssh-keygen` and `exit` (closes the stream without a marker). Trailing
/// `# comments` and a trailing `&` are accepted.
struct FakeShell {
    cwd: String,
    home: String,
    files: MockFiles,
}

struct Reply {
    stdout: String,
    stderr: String,
    code: i32,
}

impl Reply {
    fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: 0,
        }
    }

    fn fail(stderr: impl Into<String>, code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code,
        }
    }
}

impl FakeShell {
    async fn run(
        mut self,
        mut input: tokio::io::DuplexStream,
        mut output: FramedWrite<tokio::io::DuplexStream, FrameCodec>,
    ) {
        let suffix = format!("; echo -n '{}' $? >&2\n", COMPLETION_MARKER);
        let mut pending = String::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = match input.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            pending.push_str(&String::from_utf8_lossy(&buf[..n]));

            while let Some(pos) = pending.find(&suffix) {
                let command = pending[..pos].to_string();
                pending.drain(..pos + suffix.len());

                let command = match command.strip_prefix("{ ").and_then(|c| c.strip_suffix("\n}")) {
                    Some(inner) => inner.to_string(),
                    // Ungrouped lines behave the way bash treats them.
                    None if command.trim_end().ends_with('&') => {
                        let _ = output
                            .send(Frame::stderr("bash: syntax error near unexpected token `;'\n"))
                            .await;
                        return;
                    }
                    None if strip_comment(&command).len() != command.len() => continue,
                    None => command,
                };
                if command.trim() == "exit" {
                    return;
                }

                let reply = self.interpret(&command);
                let mut frames = Vec::new();
                if !reply.stdout.is_empty() {
                    frames.push(Frame::stdout(reply.stdout));
                }
                if !reply.stderr.is_empty() {
                    frames.push(Frame::stderr(reply.stderr));
                }
                frames.push(Frame::stderr(format!("{} {}", COMPLETION_MARKER, reply.code)));
                for frame in frames {
                    if output.send(frame).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn resolve(&self, path: &str) -> String {
        let path = path.trim_matches(|c| c == '\'' || c == '"');
        let joined = if path.starts_with('/') {
            path.to_string()
        } else if path == "." {
            self.cwd.clone()
        } else {
            format!("{}/{}", self.cwd.trim_end_matches('/'), path)
        };
        if joined.len() > 1 {
            joined.trim_end_matches('/').to_string()
        } else {
            joined
        }
    }

    fn interpret(&mut self, command: &str) -> Reply {
        let command = strip_comment(command).trim().trim_end_matches('&');
        let (head, rest) = command
            .trim()
            .split_once(char::is_whitespace)
            .map(|(h, r)| (h, r.trim()))
            .unwrap_or((command.trim(), ""));

        match head {
            "cd" => {
                self.cwd = if rest.is_empty() {
                    self.home.clone()
                } else {
                    self.resolve(rest)
                };
                Reply::ok("")
            }
            "pwd" => Reply::ok(format!("{}\n", self.cwd)),
            "echo" => Reply::ok(format!("{}\n", rest.replace(['\'', '"'], ""))),
            "true" | "chown" => Reply::ok(""),
            "false" => Reply::fail("", 1),
            "cat" => {
                let path = self.resolve(rest);
                let files = self.files.lock().map(|f| f.get(&path).cloned()).ok().flatten();
                match files {
                    Some(content) => Reply::ok(content),
                    None => Reply::fail(format!("cat: {}: No such file or directory\n", rest), 1),
                }
            }
            "ls" => {
                let dir = self.resolve(rest.trim_start_matches("-la").trim());
                let prefix = format!("{}/", dir.trim_end_matches('/'));
                let listing: Vec<String> = self
                    .files
                    .lock()
                    .map(|f| {
                        f.iter()
                            .filter_map(|(path, content)| {
                                let name = path.strip_prefix(&prefix)?;
                                (!name.contains('/')).then(|| {
                                    format!("-rw-r--r-- 1 developer developer {} {}", content.len(), name)
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let mut out = format!("total {}\n", listing.len());
                for line in listing {
                    out.push_str(&line);
                    out.push('\n');
                }
                Reply::ok(out)
            }
            "tee" => {
                let Some((path, body)) = rest.split_once(" <<'EOF'\n") else {
                    return Reply::fail("tee: missing here-document\n", 2);
                };
                let content = format!("{}\n", body.strip_suffix("\nEOF").unwrap_or(body));
                let path = self.resolve(path);
                if let Ok(mut files) = self.files.lock() {
                    files.insert(path, content.clone());
                }
                Reply::ok(content)
            }
            "ssh-keygen" => Reply::ok("Generating public/private ed25519 key pair.\n"),
            "sleep" => Reply::ok(""),
            _ => Reply::fail(format!("sh: 1: {}: not found\n", head), 127),
        }
    }
}

/// Drop a trailing `# comment` from a single-line command.
fn strip_comment(command: &str) -> &str {
    if command.contains('\n') {
        return command;
    }
    match command.find(" #") {
        Some(at) => &command[..at],
        None if command.trim_start().starts_with('#') => "",
        None => command,
    }
}

//! Sandbox tools implementing the `Tool` trait.
//!
//! File tools are thin command translations run through the persistent shell,
//! so they share its working directory and its error semantics: a non-zero
//! exit reaches the caller as `Error::CommandFailed`. Missing arguments are
//! answered with an explanatory output rather than an error.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use shellpilot_core::{traits::Tool, Result};

use crate::lifecycle::ContainerManager;
use crate::shell::ShellChannel;

/// Prefix of `file_read` output meant for the client's download/copy handler.
pub const FILE_CONTENT_PREFIX: &str = "--- FILE_CONTENT ---";

/// All sandbox-backed tools sharing one shell channel.
pub fn sandbox_tools(channel: Arc<ShellChannel>) -> Vec<Arc<dyn Tool>> {
    let manager = channel.manager().clone();
    vec![
        Arc::new(ShellExecTool::new(channel.clone())),
        Arc::new(FileReadTool::new(channel.clone())),
        Arc::new(FileWriteTool::new(channel.clone())),
        Arc::new(FileListTool::new(channel.clone())),
        Arc::new(SshKeyGenTool::new(channel)),
        Arc::new(DockerStartTool::new(manager.clone())),
        Arc::new(DockerStopTool::new(manager.clone())),
        Arc::new(DockerRebuildTool::new(manager.clone())),
        Arc::new(DockerStatusTool::new(manager)),
    ]
}

// =============================================================================
// Shell Tool
// =============================================================================

/// Runs a command in the persistent shell.
pub struct ShellExecTool {
    channel: Arc<ShellChannel>,
}

impl ShellExecTool {
    pub fn new(channel: Arc<ShellChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Executes a shell command inside the development container. The shell is \
         persistent: 'cd' and exported variables carry over to later commands."
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        if args.is_empty() {
            return Ok("Error: missing command to execute.".to_string());
        }
        self.channel.run(&args.join(" ")).await
    }
}

// =============================================================================
// File Tools
// =============================================================================

/// Reads a file with `cat`.
pub struct FileReadTool {
    channel: Arc<ShellChannel>,
}

impl FileReadTool {
    pub fn new(channel: Arc<ShellChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Reads the entire content of a file in the container. Add 'for download' \
         or 'for copy' after the path to hand the file to the user."
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        let Some(path) = args.first() else {
            return Ok("Error: file_read requires a file path.".to_string());
        };

        let content = self.channel.run(&format!("cat {}", path)).await?;

        let request = args.join(" ");
        let action = if request.contains("for download") {
            "download"
        } else if request.contains("for copy") {
            "copy"
        } else {
            return Ok(content);
        };

        let name = path.rsplit('/').next().unwrap_or(path);
        let info = json!({
            "name": name,
            "content": content,
            "action": action,
        });
        Ok(format!("{}{}", FILE_CONTENT_PREFIX, info))
    }
}

/// Writes a file through a quoted here-document, then hands it to the
/// container user.
pub struct FileWriteTool {
    channel: Arc<ShellChannel>,
}

impl FileWriteTool {
    pub fn new(channel: Arc<ShellChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Writes content to a file in the container, replacing it if it exists. \
         The first argument is the path, the rest is the content."
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        if args.len() < 2 {
            return Ok(
                "Error: file_write requires at least two arguments: the file path and the content."
                    .to_string(),
            );
        }
        let path = &args[0];
        let content = args[1..].join(" ");

        self.channel
            .run(&format!("tee {} <<'EOF'\n{}\nEOF", path, content))
            .await?;

        let user = &self.channel.manager().settings().user;
        if let Err(e) = self.channel.run(&format!("chown {} {}", user, path)).await {
            tracing::debug!(path = %path, error = %e, "Ownership fix after write failed");
        }

        Ok(format!("Successfully wrote to {}", path))
    }
}

/// Lists a directory with `ls -la`.
pub struct FileListTool {
    channel: Arc<ShellChannel>,
}

impl FileListTool {
    pub fn new(channel: Arc<ShellChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "Lists all files and directories in a path, including hidden ones. Use '.' \
         for the current directory."
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        let path = args.first().map(String::as_str).unwrap_or(".");
        self.channel.run(&format!("ls -la {}", path)).await
    }
}

// =============================================================================
// Key Generation
// =============================================================================

/// Generates an ed25519 key pair in the bind-mounted home directory.
pub struct SshKeyGenTool {
    channel: Arc<ShellChannel>,
    key_path: String,
}

impl SshKeyGenTool {
    pub fn new(channel: Arc<ShellChannel>) -> Self {
        let key_path = format!(
            "{}/id_ed25519",
            channel.manager().settings().mount_target.trim_end_matches('/')
        );
        Self { channel, key_path }
    }
}

#[async_trait]
impl Tool for SshKeyGenTool {
    fn name(&self) -> &str {
        "ssh_key_gen"
    }

    fn description(&self) -> &str {
        "Generates a new ed25519 SSH key pair named id_ed25519 with no passphrase \
         in the home directory."
    }

    async fn execute(&self, _args: &[String]) -> Result<String> {
        self.channel
            .run(&format!("ssh-keygen -t ed25519 -f {} -N ''", self.key_path))
            .await?;
        Ok(format!(
            "Successfully generated new ed25519 key pair in {}.",
            self.key_path
        ))
    }
}

// =============================================================================
// Container Control
// =============================================================================

pub struct DockerStartTool {
    manager: Arc<ContainerManager>,
}

impl DockerStartTool {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for DockerStartTool {
    fn name(&self) -> &str {
        "docker_start"
    }

    fn description(&self) -> &str {
        "Starts the sandbox container, building it first if it does not exist."
    }

    async fn execute(&self, _args: &[String]) -> Result<String> {
        let id = self.manager.ensure_running().await?;
        Ok(format!("Container running ({}).", short_id(&id)))
    }
}

pub struct DockerStopTool {
    manager: Arc<ContainerManager>,
}

impl DockerStopTool {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for DockerStopTool {
    fn name(&self) -> &str {
        "docker_stop"
    }

    fn description(&self) -> &str {
        "Stops the sandbox container."
    }

    async fn execute(&self, _args: &[String]) -> Result<String> {
        self.manager.stop().await?;
        Ok("Container stopped.".to_string())
    }
}

pub struct DockerRebuildTool {
    manager: Arc<ContainerManager>,
}

impl DockerRebuildTool {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for DockerRebuildTool {
    fn name(&self) -> &str {
        "docker_rebuild"
    }

    fn description(&self) -> &str {
        "Removes the sandbox container and recreates it from a fresh image build. \
         Files outside the home directory are lost."
    }

    async fn execute(&self, _args: &[String]) -> Result<String> {
        let id = self.manager.rebuild().await?;
        Ok(format!("Container rebuilt ({}).", short_id(&id)))
    }
}

pub struct DockerStatusTool {
    manager: Arc<ContainerManager>,
}

impl DockerStatusTool {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for DockerStatusTool {
    fn name(&self) -> &str {
        "docker_status"
    }

    fn description(&self) -> &str {
        "Reports whether the sandbox container is running, stopped or missing."
    }

    async fn execute(&self, _args: &[String]) -> Result<String> {
        let status = self.manager.status().await?;
        let mut out = status.status.to_string();
        if let Some(details) = &status.details {
            out.push_str(&format!(" ({})", details));
        }
        Ok(out)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

//! Container runtime abstraction.
//!
//! `ContainerRuntime` is the narrow set of runtime calls the lifecycle manager,
//! the shell channel and the terminal bridge need. `DockerRuntime` implements
//! it over the Docker Engine API via `bollard`; image builds shell out to the
//! `docker` CLI so the build context does not have to be tarred in-process.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use shellpilot_core::{Error, Result};

use crate::frame::{AttachedStream, Frame};

// =============================================================================
// Runtime Types
// =============================================================================

/// A container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    /// Raw human-readable status, e.g. `Up 3 minutes` or `Exited (0) 2 hours ago`.
    pub status: String,
}

impl ContainerInfo {
    /// The runtime reports running containers with an `Up ...` status.
    pub fn is_running(&self) -> bool {
        self.status.trim().to_lowercase().starts_with("up")
    }
}

/// How to build the sandbox image.
#[derive(Debug, Clone)]
pub struct ImageBuildSpec {
    pub tag: String,
    pub context: PathBuf,
    pub dockerfile: PathBuf,
}

/// How to create the sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Absolute host path bind-mounted at `mount_target`.
    pub host_dir: PathBuf,
    pub mount_target: String,
    pub user: String,
    pub workdir: String,
}

/// Result of a one-shot exec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Process spec for attached execs.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub user: String,
    pub workdir: String,
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look up a container by exact name, including stopped ones.
    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>>;

    /// Build (or rebuild) an image.
    async fn build_image(&self, spec: &ImageBuildSpec) -> Result<()>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container. Stopping a stopped or missing container succeeds.
    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Force-remove a container. A missing container counts as removed.
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Run `sh -c <command>` to completion.
    async fn exec(&self, id: &str, command: &str, user: Option<&str>) -> Result<ExecOutput>;

    /// Start a long-lived non-TTY process with stdin attached.
    async fn attach(&self, id: &str, spec: &ExecSpec) -> Result<AttachedStream>;

    /// Start a TTY-backed process with stdin attached.
    async fn attach_tty(&self, id: &str, spec: &ExecSpec) -> Result<AttachedStream>;

    /// Resize the TTY of an exec started by `attach_tty`.
    async fn resize_tty(&self, exec_id: &str, rows: u16, cols: u16) -> Result<()>;

    /// Whether the runtime daemon answers.
    async fn ping(&self) -> bool;
}

// =============================================================================
// Docker Runtime Implementation
// =============================================================================

/// Docker-based runtime using the `bollard` crate.
pub struct DockerRuntime {
    docker: bollard::Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn connect() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::runtime_unavailable(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self { docker })
    }

    /// Create from an existing bollard Docker client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }

    async fn start_attached(&self, id: &str, spec: &ExecSpec, tty: bool) -> Result<AttachedStream> {
        use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};

        let options = CreateExecOptions {
            cmd: Some(spec.cmd.clone()),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(tty),
            user: Some(spec.user.clone()),
            working_dir: Some(spec.workdir.clone()),
            env: tty.then(|| vec!["TERM=xterm-256color".to_string()]),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| map_docker_error("create exec", e))?;

        let started = self
            .docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    tty,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_docker_error("start exec", e))?;

        match started {
            StartExecResults::Attached { output, input } => {
                let output = output.map(|item| {
                    item.map(Frame::from)
                        .map_err(|e| Error::protocol_desync(format!("exec stream failed: {}", e)))
                });
                tracing::debug!(container = %id, exec_id = %exec.id, tty, "Exec attached");
                Ok(AttachedStream {
                    exec_id: exec.id,
                    output: Box::pin(output),
                    input,
                })
            }
            StartExecResults::Detached => Err(Error::container(
                "exec started detached; expected an attached stream",
            )),
        }
    }
}

/// Map a bollard error. Daemon responses are container errors; anything that
/// never reached the daemon means the runtime is unreachable.
fn map_docker_error(context: &str, err: bollard::errors::Error) -> Error {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => Error::container(format!("{} failed ({}): {}", context, status_code, message)),
        other => Error::runtime_unavailable(format!("{} failed: {}", context, other)),
    }
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([("name".to_string(), vec![name.to_string()])]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_docker_error("list containers", e))?;

        // The name filter is a substring match; names carry a leading slash.
        let wanted = format!("/{}", name);
        Ok(containers.into_iter().find_map(|c| {
            let matches = c
                .names
                .as_ref()
                .is_some_and(|names| names.iter().any(|n| n == &wanted || n == name));
            if !matches {
                return None;
            }
            Some(ContainerInfo {
                id: c.id?,
                status: c.status.unwrap_or_default(),
            })
        }))
    }

    async fn build_image(&self, spec: &ImageBuildSpec) -> Result<()> {
        tracing::info!(tag = %spec.tag, context = %spec.context.display(), "Building sandbox image");

        let output = tokio::process::Command::new("docker")
            .args(["build", "-t", &spec.tag, "-f"])
            .arg(&spec.dockerfile)
            .arg(&spec.context)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::runtime_unavailable(format!("cannot run docker CLI: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::image_build(format!(
                "docker build failed for {}: {}",
                spec.tag,
                stderr.trim()
            )));
        }

        tracing::info!(tag = %spec.tag, "Sandbox image ready");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::HostConfig;

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                spec.host_dir.display(),
                spec.mount_target
            )]),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            user: Some(spec.user.clone()),
            working_dir: Some(spec.workdir.clone()),
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            host_config: Some(host_config),
            labels: Some(HashMap::from([(
                "managed-by".to_string(),
                "shellpilot".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_docker_error("create container", e))?;

        tracing::info!(container = %spec.name, id = %created.id, image = %spec.image, "Sandbox container created");
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| map_docker_error("start container", e))
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        use bollard::container::StopContainerOptions;

        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped, 404: gone
            Err(e) if matches!(status_code(&e), Some(304) | Some(404)) => Ok(()),
            Err(e) => Err(map_docker_error("stop container", e)),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        use bollard::container::RemoveContainerOptions;

        match self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(map_docker_error("remove container", e)),
        }
    }

    async fn exec(&self, id: &str, command: &str, user: Option<&str>) -> Result<ExecOutput> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let options = CreateExecOptions {
            cmd: Some(vec!["sh", "-c", command]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            user,
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| map_docker_error("create exec", e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_docker_error("start exec", e))?
        {
            while let Some(msg) = output.next().await {
                match msg.map(Frame::from) {
                    Ok(frame) if frame.kind == crate::frame::StreamKind::Stderr => {
                        stderr.push_str(&String::from_utf8_lossy(&frame.payload));
                    }
                    Ok(frame) => stdout.push_str(&String::from_utf8_lossy(&frame.payload)),
                    Err(e) => {
                        stderr.push_str(&format!("\n[exec stream error: {}]", e));
                        break;
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| map_docker_error("inspect exec", e))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn attach(&self, id: &str, spec: &ExecSpec) -> Result<AttachedStream> {
        self.start_attached(id, spec, false).await
    }

    async fn attach_tty(&self, id: &str, spec: &ExecSpec) -> Result<AttachedStream> {
        self.start_attached(id, spec, true).await
    }

    async fn resize_tty(&self, exec_id: &str, rows: u16, cols: u16) -> Result<()> {
        use bollard::exec::ResizeExecOptions;

        self.docker
            .resize_exec(
                exec_id,
                ResizeExecOptions {
                    height: rows,
                    width: cols,
                },
            )
            .await
            .map_err(|e| map_docker_error("resize exec", e))
    }

    async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_status_prefix() {
        let info = |status: &str| ContainerInfo {
            id: "abc".into(),
            status: status.into(),
        };
        assert!(info("Up 3 minutes").is_running());
        assert!(info("up About an hour").is_running());
        assert!(!info("Exited (0) 2 hours ago").is_running());
        assert!(!info("Created").is_running());
    }

    #[test]
    fn test_server_errors_are_container_errors() {
        let err = map_docker_error(
            "start container",
            bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "boom".into(),
            },
        );
        assert!(matches!(err, Error::Container(_)));
    }
}

//! Container lifecycle management.
//!
//! `ContainerManager` owns the single named sandbox container. Every
//! operation is serialized behind one lock and bounded by the configured
//! timeout and the process-wide shutdown token. Dropping the in-flight
//! runtime future on timeout aborts the underlying call; a CLI image build is
//! killed with it.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use shellpilot_core::config::SandboxSettings;
use shellpilot_core::{Error, Result};

use crate::engine::{ContainerInfo, ContainerRuntime, ContainerSpec, ImageBuildSpec};

/// Coarse container state exposed to tools and HTTP handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    NotFound,
    Stopped,
    Running,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Result of `ContainerManager::status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub status: ContainerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Raw runtime status string, e.g. `Up 3 minutes`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ContainerStatus {
    fn from_info(info: Option<ContainerInfo>) -> Self {
        match info {
            None => Self {
                status: ContainerState::NotFound,
                container_id: None,
                details: None,
            },
            Some(info) => Self {
                status: if info.is_running() {
                    ContainerState::Running
                } else {
                    ContainerState::Stopped
                },
                container_id: Some(info.id),
                details: Some(info.status),
            },
        }
    }
}

/// Manages the sandbox container shared by every client session.
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    settings: SandboxSettings,
    shutdown: CancellationToken,
    /// Bumped whenever the container is stopped or replaced.
    generation: AtomicU64,
    op_lock: tokio::sync::Mutex<()>,
}

impl ContainerManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        settings: SandboxSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            settings,
            shutdown,
            generation: AtomicU64::new(0),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Current container generation. Shell sessions attached under an older
    /// generation are stale.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fail with `RuntimeUnavailable` when the container daemon does not answer.
    pub async fn check_runtime(&self) -> Result<()> {
        if self.runtime.ping().await {
            Ok(())
        } else {
            Err(Error::runtime_unavailable("container daemon did not answer ping"))
        }
    }

    /// Make sure the container exists and is running; returns its id.
    pub async fn ensure_running(&self) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        self.bounded("ensure_running", self.ensure_running_inner())
            .await
    }

    /// Stop the container. Succeeds when it is already stopped or absent.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.bounded("stop", async {
            if let Some(info) = self.runtime.find_container(&self.settings.container_name).await? {
                if info.is_running() {
                    tracing::info!(container = %self.settings.container_name, "Stopping sandbox container");
                    self.runtime.stop_container(&info.id).await?;
                }
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
        .await
    }

    /// Stop, remove and recreate the container from a fresh image build.
    pub async fn rebuild(&self) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        self.bounded("rebuild", async {
            self.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(info) = self.runtime.find_container(&self.settings.container_name).await? {
                tracing::info!(container = %self.settings.container_name, id = %info.id, "Removing sandbox container for rebuild");
                self.runtime.stop_container(&info.id).await?;
                self.runtime.remove_container(&info.id).await?;
            }
            self.provision().await
        })
        .await
    }

    /// Map runtime state to `not_found | stopped | running`.
    pub async fn status(&self) -> Result<ContainerStatus> {
        let info = self
            .runtime
            .find_container(&self.settings.container_name)
            .await?;
        Ok(ContainerStatus::from_info(info))
    }

    async fn ensure_running_inner(&self) -> Result<String> {
        match self
            .runtime
            .find_container(&self.settings.container_name)
            .await?
        {
            Some(info) if info.is_running() => Ok(info.id),
            Some(info) => {
                tracing::info!(container = %self.settings.container_name, status = %info.status, "Starting stopped sandbox container");
                self.runtime.start_container(&info.id).await?;
                Ok(info.id)
            }
            None => {
                tracing::info!(container = %self.settings.container_name, "Sandbox container not found, provisioning");
                self.provision().await
            }
        }
    }

    async fn provision(&self) -> Result<String> {
        let host_dir = self.prepare_bind_mount().await?;

        self.runtime
            .build_image(&ImageBuildSpec {
                tag: self.settings.image.clone(),
                context: PathBuf::from(&self.settings.build_context),
                dockerfile: PathBuf::from(&self.settings.build_context)
                    .join(&self.settings.dockerfile),
            })
            .await?;

        let id = self
            .runtime
            .create_container(&ContainerSpec {
                name: self.settings.container_name.clone(),
                image: self.settings.image.clone(),
                host_dir,
                mount_target: self.settings.mount_target.clone(),
                user: self.settings.user.clone(),
                workdir: self.settings.workdir.clone(),
            })
            .await?;
        self.runtime.start_container(&id).await?;

        if let Some(init) = &self.settings.init_command {
            match self
                .runtime
                .exec(&id, init, Some(&self.settings.user))
                .await
            {
                Ok(out) if out.success() => {
                    tracing::debug!(container = %id, "Init command completed");
                }
                Ok(out) => {
                    tracing::warn!(container = %id, exit_code = out.exit_code, stderr = %out.stderr.trim(), "Init command failed");
                }
                Err(e) => {
                    tracing::warn!(container = %id, error = %e, "Init command could not run");
                }
            }
        }

        tracing::info!(container = %self.settings.container_name, id = %id, "Sandbox container running");
        Ok(id)
    }

    /// Create the host directory and optionally hand it to the container user.
    async fn prepare_bind_mount(&self) -> Result<PathBuf> {
        let dir = PathBuf::from(&self.settings.host_dir);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::bind_mount(format!("cannot create {}: {}", dir.display(), e))
        })?;

        #[cfg(unix)]
        if self.settings.chown_uid.is_some() || self.settings.chown_gid.is_some() {
            std::os::unix::fs::chown(&dir, self.settings.chown_uid, self.settings.chown_gid)
                .map_err(|e| Error::bind_mount(format!("cannot chown {}: {}", dir.display(), e)))?;
        }

        tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| Error::bind_mount(format!("cannot resolve {}: {}", dir.display(), e)))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.settings.operation_timeout();
        let token = self.shutdown.child_token();

        let result = tokio::select! {
            res = fut => res,
            _ = tokio::time::sleep(timeout) => {
                token.cancel();
                Err(Error::Timeout(format!(
                    "container {} exceeded {}s",
                    operation,
                    timeout.as_secs()
                )))
            }
            _ = token.cancelled() => Err(Error::Cancelled(format!("container {} aborted by shutdown", operation))),
        };

        match &result {
            Ok(_) => shellpilot_telemetry::track_lifecycle(operation, "ok"),
            Err(e) => {
                tracing::error!(operation, error = %e, "Container operation failed");
                shellpilot_telemetry::track_lifecycle(operation, "error");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;

    fn settings(dir: &str) -> SandboxSettings {
        SandboxSettings {
            host_dir: std::env::temp_dir()
                .join(format!("shellpilot-lifecycle-{}", dir))
                .display()
                .to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let manager = ContainerManager::new(
            Arc::new(MockRuntime::new()),
            settings("status"),
            CancellationToken::new(),
        );
        let status = manager.status().await.unwrap();
        assert_eq!(status.status, ContainerState::NotFound);
        assert!(status.container_id.is_none());
    }

    #[tokio::test]
    async fn test_status_serializes_snake_case() {
        let status = ContainerStatus::from_info(Some(ContainerInfo {
            id: "abc".into(),
            status: "Exited (0) 5 seconds ago".into(),
        }));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["details"], "Exited (0) 5 seconds ago");
    }

    #[tokio::test]
    async fn test_stop_bumps_generation() {
        let runtime = Arc::new(MockRuntime::with_container(true));
        let manager =
            ContainerManager::new(runtime.clone(), settings("stop"), CancellationToken::new());
        let before = manager.generation();
        manager.stop().await.unwrap();
        assert!(manager.generation() > before);
        assert_eq!(manager.status().await.unwrap().status, ContainerState::Stopped);
    }

    #[tokio::test]
    async fn test_check_runtime() {
        let manager = ContainerManager::new(
            Arc::new(MockRuntime::new()),
            settings("ping"),
            CancellationToken::new(),
        );
        assert!(manager.check_runtime().await.is_ok());

        let manager = ContainerManager::new(
            Arc::new(MockRuntime::new().unreachable()),
            settings("ping-down"),
            CancellationToken::new(),
        );
        let err = manager.check_runtime().await.unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable(_)));
        assert!(err.is_provisioning());
    }

    #[tokio::test]
    async fn test_provision_creates_host_dir() {
        let settings = settings(&format!("mount-{}", std::process::id()));
        let host_dir = PathBuf::from(&settings.host_dir);
        let _ = std::fs::remove_dir_all(&host_dir);

        let manager =
            ContainerManager::new(Arc::new(MockRuntime::new()), settings, CancellationToken::new());
        manager.ensure_running().await.unwrap();
        assert!(host_dir.is_dir());
    }

    #[tokio::test]
    async fn test_bind_mount_failure_is_distinct() {
        let file = std::env::temp_dir().join(format!("shellpilot-not-a-dir-{}", std::process::id()));
        std::fs::write(&file, b"x").unwrap();
        let settings = SandboxSettings {
            host_dir: file.join("home").display().to_string(),
            ..Default::default()
        };

        let runtime = Arc::new(MockRuntime::new());
        let manager = ContainerManager::new(runtime.clone(), settings, CancellationToken::new());
        let err = manager.ensure_running().await.unwrap_err();
        assert!(matches!(err, Error::BindMount(_)));
        assert_eq!(runtime.builds(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_operation() {
        let runtime = Arc::new(MockRuntime::new().with_build_delay(std::time::Duration::from_secs(60)));
        let shutdown = CancellationToken::new();
        let manager = ContainerManager::new(runtime, settings("cancel"), shutdown.clone());
        shutdown.cancel();
        let err = manager.ensure_running().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }
}

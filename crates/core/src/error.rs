//! Error types for Shellpilot.

use thiserror::Error;

/// Result type alias using Shellpilot's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Shellpilot.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Provisioning Errors (Container Lifecycle)
    // =========================================================================
    #[error("Failed to build sandbox image: {0}")]
    ImageBuild(String),

    #[error("Host bind-mount preparation failed: {0}")]
    BindMount(String),

    #[error("Container runtime unreachable: {0}")]
    RuntimeUnavailable(String),

    #[error("Container operation failed: {0}")]
    Container(String),

    // =========================================================================
    // Shell Channel Errors
    // =========================================================================
    #[error("Shell protocol desync: {0}")]
    ProtocolDesync(String),

    /// A command ran to completion but exited non-zero. Not a system failure.
    #[error("command exited with non-zero status {exit_code}: {stderr}")]
    CommandFailed { exit_code: String, stderr: String },

    // =========================================================================
    // Tool Errors
    // =========================================================================
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    // =========================================================================
    // Planner Errors
    // =========================================================================
    #[error("Planner error: {0}")]
    Planner(String),

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    #[error("Gateway error: {0}")]
    Gateway(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an image build error.
    pub fn image_build(msg: impl Into<String>) -> Self {
        Self::ImageBuild(msg.into())
    }

    /// Create a bind-mount error.
    pub fn bind_mount(msg: impl Into<String>) -> Self {
        Self::BindMount(msg.into())
    }

    /// Create a runtime-unreachable error.
    pub fn runtime_unavailable(msg: impl Into<String>) -> Self {
        Self::RuntimeUnavailable(msg.into())
    }

    /// Create a container operation error.
    pub fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    /// Create a protocol desync error.
    pub fn protocol_desync(msg: impl Into<String>) -> Self {
        Self::ProtocolDesync(msg.into())
    }

    /// Create a failed-command error.
    pub fn command_failed(exit_code: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            exit_code: exit_code.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create an invalid arguments error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a tool execution error.
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a planner error.
    pub fn planner(msg: impl Into<String>) -> Self {
        Self::Planner(msg.into())
    }

    /// Create a gateway error.
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from provisioning the sandbox.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::ImageBuild(_) | Self::BindMount(_) | Self::RuntimeUnavailable(_) | Self::Container(_)
        )
    }

    /// Whether the command itself ran and reported a non-zero exit status.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
        let err = Error::command_failed("2", "ls: cannot access 'nope'");
        assert_eq!(
            err.to_string(),
            "command exited with non-zero status 2: ls: cannot access 'nope'"
        );
        assert!(err.is_command_failure());
        assert!(!err.is_provisioning());
    }

    #[test]
    fn test_provisioning_kinds() {
        assert!(Error::image_build("boom").is_provisioning());
        assert!(Error::bind_mount("denied").is_provisioning());
        assert!(Error::runtime_unavailable("no socket").is_provisioning());
        assert!(!Error::protocol_desync("eof").is_provisioning());
    }
}

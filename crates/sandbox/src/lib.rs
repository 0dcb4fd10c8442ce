//! Sandbox for Shellpilot.
//!
//! Everything the agent runs happens inside one long-lived Docker container
//! with a host directory bind-mounted as the user's home.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Tools (shell_exec, file_*, docker_*)  │
//! │    ↓ run(command)                      │
//! ├────────────────────────────────────────┤
//! │  ShellChannel (persistent shell,       │
//! │    marker-framed transactions)         │
//! │    ↓ attach                            │
//! ├────────────────────────────────────────┤
//! │  ContainerManager (ensure/stop/        │
//! │    rebuild/status, bounded ops)        │
//! │    ↓ ContainerRuntime                  │
//! ├────────────────────────────────────────┤
//! │  DockerRuntime (bollard + docker CLI)  │
//! └────────────────────────────────────────┘
//! ```
//!
//! Terminals (`terminal`) are a separate TTY exec in the same container.

pub mod engine;
pub mod frame;
pub mod lifecycle;
pub mod mock;
pub mod shell;
pub mod terminal;
pub mod tools;

pub use engine::{ContainerInfo, ContainerRuntime, DockerRuntime, ExecOutput};
pub use lifecycle::{ContainerManager, ContainerState, ContainerStatus};
pub use mock::MockRuntime;
pub use shell::{ShellChannel, ShellSession, COMPLETION_MARKER};
pub use terminal::{bridge, PeerFrame, ResizeSignal, TerminalSession};
pub use tools::sandbox_tools;

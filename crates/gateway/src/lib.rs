//! HTTP and WebSocket entry point for Shellpilot.
//!
//! Routes:
//! - `/ws`: agent socket (tasks, direct tool calls, `/tools`)
//! - `/docker/shell`: interactive terminal
//! - `/docker/{status,start,stop,rebuild}`: container control
//! - `/health`, `/metrics`

pub mod agent_socket;
pub mod docker_routes;
pub mod server;
pub mod terminal_socket;

pub use agent_socket::agent_session;
pub use server::{AppState, GatewayServer};

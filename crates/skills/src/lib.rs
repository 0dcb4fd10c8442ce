//! Tools for Shellpilot.
//!
//! This crate provides:
//! - Tool registry mapping names to implementations
//! - Built-in tools that need no sandbox (`conversation`)

pub mod builtin;
pub mod registry;

pub use builtin::ConversationTool;
pub use registry::DefaultToolRegistry;

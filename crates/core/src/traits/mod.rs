//! Core traits for Shellpilot.
//!
//! - `skills`: Tool and ToolRegistry
//! - `llm`: LlmClient used by the planner

pub mod skills;
pub mod llm;

pub use skills::*;
pub use llm::*;

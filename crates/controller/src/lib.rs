//! Orchestration for Shellpilot.
//!
//! This crate provides:
//! - Single-turn dispatch of free-form requests
//! - The autonomous planning loop over the tool registry
//! - Planner-output parsing with graceful fallback
//! - The `autonomous_execution` tool

pub mod autonomous;
pub mod builder;
pub mod dispatch;
pub mod orchestrator;
pub mod parser;

pub use autonomous::AutonomousExecutionTool;
pub use builder::OrchestratorBuilder;
pub use dispatch::Dispatch;
pub use orchestrator::{Orchestrator, Outcome, Termination};
pub use parser::{clean_response, parse_decision};

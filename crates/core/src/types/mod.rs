//! Core type definitions for Shellpilot.

pub mod tool;
pub mod agent;
pub mod gateway_contract;

pub use tool::*;
pub use agent::*;
pub use gateway_contract::*;

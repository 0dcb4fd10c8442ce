//! Planner clients for Shellpilot.
//!
//! This crate provides:
//! - Rig LLM client adapter (OpenAI, Anthropic, Gemini)
//! - Requests-per-minute limiting in front of any client

pub mod rate_limit;
pub mod rig_client;

pub use rate_limit::RateLimitedClient;
pub use rig_client::{RigConfig, RigLlmClient, RigProvider};

use std::sync::Arc;

use shellpilot_core::{config::PlannerConfig, traits::LlmClient, Result};

/// Build the rate-limited planner client described by `config`.
pub fn create_planner_client(config: &PlannerConfig) -> Result<Arc<dyn LlmClient>> {
    let client = RigLlmClient::new(RigConfig::from_planner(config)?)?;
    tracing::info!(provider = %config.provider, model = %client.model(), rpm = config.requests_per_minute, "Planner client ready");
    Ok(Arc::new(RateLimitedClient::new(
        Arc::new(client),
        config.requests_per_minute,
    )))
}

//! Parser module for planner responses.
//!
//! Turns raw planner text into an [`AgentDecision`]. Models often wrap their
//! JSON in markdown fences, so those are stripped first.

use shellpilot_core::types::AgentDecision;

/// Strip surrounding whitespace and a markdown code fence, if any.
pub fn clean_response(response: &str) -> &str {
    let trimmed = response.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let unfenced = unfenced.strip_suffix("```").unwrap_or(unfenced);
    unfenced.trim()
}

/// Parse a planner response into a decision.
///
/// Malformed output never fails the turn: it becomes a `conversation`
/// decision carrying the raw (uncleaned) planner text.
pub fn parse_decision(response: &str) -> AgentDecision {
    match serde_json::from_str::<AgentDecision>(clean_response(response)) {
        Ok(decision) => decision,
        Err(e) => {
            tracing::debug!(error = %e, "Planner response is not a decision, treating as conversation");
            AgentDecision::conversation(response)
        }
    }
}
